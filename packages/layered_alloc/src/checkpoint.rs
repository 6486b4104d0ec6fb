use std::ops::{Deref, DerefMut};

use crate::ByteAllocator;

/// A saved allocation cursor of an [`ArenaAllocator`][crate::ArenaAllocator].
///
/// A checkpoint owns nothing. It only remembers where the cursor was, so restoring it discards
/// every allocation made since without releasing any memory blocks.
///
/// A checkpoint is only meaningful for the allocator that produced it and only until that
/// allocator is next cleared. Restoring it anywhere else panics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub(crate) arena_id: u64,
    pub(crate) generation: u64,
    pub(crate) block: usize,
    pub(crate) offset: usize,
}

impl Checkpoint {
    pub(crate) const fn new(arena_id: u64, generation: u64, block: usize, offset: usize) -> Self {
        Self {
            arena_id,
            generation,
            block,
            offset,
        }
    }
}

/// Restores a [`Checkpoint`] when dropped.
///
/// Created by [`ByteAllocator::scoped_checkpoint()`]. The guard dereferences to the allocator it
/// was taken on, so the scope allocates through the guard. If the allocator has no checkpoint
/// support the guard is inert.
///
/// # Examples
///
/// ```
/// use layered_alloc::{ArenaAllocator, ByteAllocator};
///
/// let mut arena = ArenaAllocator::builder().build()?;
///
/// let mut outer = arena.scoped_checkpoint();
/// let kept = outer.allocate(16)?;
///
/// {
///     let mut inner = outer.scoped_checkpoint();
///     inner.allocate(64)?;
/// }
///
/// // The inner scope has been rewound, the outer one not yet.
/// let next = outer.allocate(16)?;
/// assert_eq!(next.addr().get(), kept.addr().get() + 16);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
#[must_use = "the checkpoint is restored as soon as the guard is dropped"]
pub struct ScopedCheckpoint<'a, A: ByteAllocator + ?Sized> {
    allocator: &'a mut A,
    checkpoint: Option<Checkpoint>,
}

impl<'a, A: ByteAllocator + ?Sized> ScopedCheckpoint<'a, A> {
    pub(crate) fn new(allocator: &'a mut A) -> Self {
        let checkpoint = allocator.checkpoint();

        Self {
            allocator,
            checkpoint,
        }
    }

    /// The checkpoint this guard restores, or `None` if the guard is inert.
    #[must_use]
    pub fn snapshot(&self) -> Option<Checkpoint> {
        self.checkpoint
    }

    /// Restores the checkpoint now, keeping the scope open.
    ///
    /// Useful for loops that want to reuse the same memory on every iteration.
    pub fn rewind(&mut self) {
        if let Some(checkpoint) = self.checkpoint {
            self.allocator.restore(checkpoint);
        }
    }
}

impl<A: ByteAllocator + ?Sized> Deref for ScopedCheckpoint<'_, A> {
    type Target = A;

    fn deref(&self) -> &Self::Target {
        self.allocator
    }
}

impl<A: ByteAllocator + ?Sized> DerefMut for ScopedCheckpoint<'_, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.allocator
    }
}

impl<A: ByteAllocator + ?Sized> Drop for ScopedCheckpoint<'_, A> {
    fn drop(&mut self) {
        self.rewind();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::{ArenaAllocator, HeapAllocator};

    assert_impl_all!(Checkpoint: Copy, Send, Sync);
    assert_not_impl_any!(ScopedCheckpoint<'static, HeapAllocator>: Clone);

    #[test]
    fn restores_on_drop() {
        let mut arena = ArenaAllocator::builder().build().unwrap();

        let inside = {
            let mut scope = arena.scoped_checkpoint();
            scope.allocate(40).unwrap()
        };

        let after = arena.allocate(40).unwrap();
        assert_eq!(inside, after);
    }

    #[test]
    fn restores_on_early_return() {
        fn fails_halfway(arena: &mut ArenaAllocator) -> crate::Result<()> {
            let mut scope = arena.scoped_checkpoint();
            scope.allocate(40)?;
            scope.allocate(usize::MAX)?;
            scope.allocate(40)?;
            Ok(())
        }

        let mut arena = ArenaAllocator::builder().build().unwrap();
        let before = arena.remaining_in_current_block();

        fails_halfway(&mut arena).unwrap_err();

        assert_eq!(arena.remaining_in_current_block(), before);
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut arena = ArenaAllocator::builder().build().unwrap();

        let mut outer = arena.scoped_checkpoint();
        let a = outer.allocate(8).unwrap();

        let b = {
            let mut inner = outer.scoped_checkpoint();
            let b = inner.allocate(8).unwrap();
            inner.allocate(8).unwrap();
            b
        };

        // Inner scope rewound to just after `a`.
        let c = outer.allocate(8).unwrap();
        assert_eq!(b, c);
        drop(outer);

        // Outer scope rewound to the very start.
        let d = arena.allocate(8).unwrap();
        assert_eq!(a, d);
    }

    #[test]
    fn rewind_keeps_scope_open() {
        let mut arena = ArenaAllocator::builder().build().unwrap();
        let mut scope = arena.scoped_checkpoint();

        let first = scope.allocate(32).unwrap();
        scope.rewind();
        let second = scope.allocate(32).unwrap();
        scope.rewind();
        let third = scope.allocate(32).unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert!(scope.snapshot().is_some());
    }
}
