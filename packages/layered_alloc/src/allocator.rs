use std::ptr::NonNull;

use crate::{Checkpoint, Result, ScopedCheckpoint};

/// The contract shared by every allocation strategy in this crate.
///
/// Allocators hand out raw, untyped byte regions. There is no alignment guarantee beyond what a
/// particular strategy documents: strategies that carve memory out of larger regions do so at
/// byte granularity, so callers storing typed values must use unaligned reads and writes.
///
/// Strategies are composable. Most of them are generic over a backing allocator that they
/// forward to when they cannot satisfy a request themselves, and they forward checkpoint
/// operations to it so that wrapping never hides a checkpoint capability further down the stack.
///
/// # Examples
///
/// ```
/// use layered_alloc::{ArenaAllocator, ByteAllocator};
///
/// let mut arena = ArenaAllocator::builder().build()?;
///
/// let first = arena.allocate(24)?;
///
/// {
///     let mut scope = arena.scoped_checkpoint();
///     scope.allocate(1000)?;
///     scope.allocate(1000)?;
/// }
///
/// // Everything allocated inside the scope has been rewound.
/// let second = arena.allocate(24)?;
/// assert_eq!(second.addr().get(), first.addr().get() + 24);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
pub trait ByteAllocator {
    /// Allocates `size` bytes.
    ///
    /// Size-zero requests are served like any other request, as far as the strategy (or
    /// ultimately the global allocator) supports them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeOverflow`][crate::Error::SizeOverflow] if the strategy cannot
    /// represent a request of this size, or [`Error::Exhausted`][crate::Error::Exhausted] if the
    /// global allocator at the bottom of the stack ran out of memory.
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>>;

    /// Returns a region previously obtained from [`allocate()`][Self::allocate].
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate()` on this same allocator (or on an allocator
    /// it shares its backing state with), `size` must be the size that was requested, and the
    /// region must not have been deallocated since. Strategies do not validate any of this and a
    /// mismatched size silently corrupts their bookkeeping.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize);

    /// Releases strategy-owned memory back to a minimal state.
    ///
    /// All regions handed out before the call become invalid for strategies that own memory.
    /// The default does nothing.
    fn clear(&mut self) {}

    /// Snapshots the allocation cursor, if this allocator (or one it forwards to) has one.
    ///
    /// The default returns `None`, which makes [`scoped_checkpoint()`][Self::scoped_checkpoint]
    /// an inert guard.
    fn checkpoint(&self) -> Option<Checkpoint> {
        None
    }

    /// Rewinds the allocation cursor to `checkpoint`, discarding every allocation made since
    /// the checkpoint was taken.
    ///
    /// The default does nothing, matching the default [`checkpoint()`][Self::checkpoint].
    ///
    /// # Panics
    ///
    /// Allocators that support checkpoints panic if `checkpoint` was taken on another allocator
    /// or before an intervening [`clear()`][Self::clear].
    fn restore(&mut self, checkpoint: Checkpoint) {
        _ = checkpoint;
    }

    /// Takes a checkpoint that is restored when the returned guard is dropped.
    ///
    /// The guard dereferences to the allocator, so allocations inside the scope go through it.
    /// Guards nest: a guard taken through another guard restores its own snapshot first.
    fn scoped_checkpoint(&mut self) -> ScopedCheckpoint<'_, Self>
    where
        Self: Sized,
    {
        ScopedCheckpoint::new(self)
    }
}

impl<A: ByteAllocator + ?Sized> ByteAllocator for &mut A {
    #[inline]
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        (**self).allocate(size)
    }

    #[inline]
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe {
            (**self).deallocate(ptr, size);
        }
    }

    #[inline]
    fn clear(&mut self) {
        (**self).clear();
    }

    #[inline]
    fn checkpoint(&self) -> Option<Checkpoint> {
        (**self).checkpoint()
    }

    #[inline]
    fn restore(&mut self, checkpoint: Checkpoint) {
        (**self).restore(checkpoint);
    }
}
