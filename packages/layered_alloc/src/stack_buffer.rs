use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use crate::{ByteAllocator, Checkpoint, HeapAllocator, Result};

/// Bump allocator over a fixed, caller-provided buffer that falls back to a backing allocator.
///
/// The buffer is borrowed for `'buf`, typically from a stack array, so the allocator itself can
/// be moved around freely without invalidating the regions it handed out.
///
/// A request is carved from the buffer if it ends strictly inside it; otherwise the whole request
/// is forwarded to the backing allocator. Regions inside the buffer are never reclaimed:
/// deallocating them does nothing, and the space only comes back when the buffer's owner goes out
/// of scope. Everything else is forwarded to the backing allocator, including checkpoints and
/// [`clear()`][ByteAllocator::clear].
///
/// # Examples
///
/// ```
/// use std::mem::MaybeUninit;
///
/// use layered_alloc::{ByteAllocator, HeapAllocator, StackBuffer};
///
/// let mut storage = [MaybeUninit::<u8>::uninit(); 64];
/// let mut stack = StackBuffer::new(&mut storage, HeapAllocator::new());
///
/// let inline = stack.allocate(16)?;
/// let spilled = stack.allocate(100)?;
/// assert_eq!(stack.used(), 16);
///
/// // SAFETY: Allocated above with the same sizes.
/// unsafe {
///     stack.deallocate(spilled, 100);
///     stack.deallocate(inline, 16);
/// }
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
pub struct StackBuffer<'buf, B: ByteAllocator = HeapAllocator> {
    start: NonNull<u8>,
    capacity: usize,

    /// Offset of the next inline region. Always strictly below `capacity` once anything has
    /// been carved.
    cursor: usize,

    backing: B,

    _storage: PhantomData<&'buf mut [MaybeUninit<u8>]>,
}

impl<'buf, B: ByteAllocator> StackBuffer<'buf, B> {
    /// Creates an allocator that carves regions out of `storage` and forwards to `backing` once
    /// `storage` is exhausted.
    #[must_use]
    pub fn new(storage: &'buf mut [MaybeUninit<u8>], backing: B) -> Self {
        let capacity = storage.len();

        Self {
            start: NonNull::from(storage).cast::<u8>(),
            capacity,
            cursor: 0,
            backing,
            _storage: PhantomData,
        }
    }

    /// Size of the borrowed buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of the buffer already handed out.
    #[must_use]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// The allocator that requests spill over to.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        ptr.addr().get().wrapping_sub(self.start.addr().get()) < self.capacity
    }
}

impl<B: ByteAllocator> ByteAllocator for StackBuffer<'_, B> {
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let end = self.cursor.saturating_add(size);

        if end < self.capacity {
            // SAFETY: The cursor is below the capacity, so the result stays inside the buffer.
            let ptr = unsafe { self.start.add(self.cursor) };
            self.cursor = end;
            return Ok(ptr);
        }

        self.backing.allocate(size)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        if self.contains(ptr) {
            return;
        }

        // SAFETY: Regions outside the buffer came from the backing allocator with this size.
        unsafe {
            self.backing.deallocate(ptr, size);
        }
    }

    fn clear(&mut self) {
        self.backing.clear();
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        self.backing.checkpoint()
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.backing.restore(checkpoint);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use alloc_log::{EventLog, Logger};
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::ArenaAllocator;

    assert_not_impl_any!(StackBuffer<'static>: Send, Sync, Clone);

    fn addr(ptr: NonNull<u8>) -> usize {
        ptr.addr().get()
    }

    #[test]
    fn carves_contiguously_from_storage() {
        let mut storage = [MaybeUninit::<u8>::uninit(); 64];
        let storage_start = storage.as_ptr().addr();
        let mut stack = StackBuffer::new(&mut storage, HeapAllocator::new());

        let a = stack.allocate(10).unwrap();
        let b = stack.allocate(20).unwrap();

        assert_eq!(addr(a), storage_start);
        assert_eq!(addr(b), storage_start + 10);
        assert_eq!(stack.used(), 30);
        assert_eq!(stack.capacity(), 64);
    }

    #[test]
    fn fits_only_strictly_inside() {
        let logger = Logger::new(EventLog::with_tracing());
        let mut storage = [MaybeUninit::<u8>::uninit(); 32];
        let mut stack = StackBuffer::new(&mut storage, HeapAllocator::with_logger(logger.clone()));

        // Would end exactly at the end of the buffer.
        let whole = stack.allocate(32).unwrap();
        assert_eq!(stack.used(), 0);
        assert_eq!(logger.meta_stats().malloc_count, 1);

        let inline = stack.allocate(31).unwrap();
        assert_eq!(stack.used(), 31);

        let spilled = stack.allocate(1).unwrap();
        assert_eq!(stack.used(), 31);
        assert_eq!(logger.meta_stats().malloc_count, 2);

        // SAFETY: All three were allocated above with the same sizes.
        unsafe {
            stack.deallocate(spilled, 1);
        }
        // SAFETY: See above.
        unsafe {
            stack.deallocate(inline, 31);
        }
        // SAFETY: See above.
        unsafe {
            stack.deallocate(whole, 32);
        }

        let stats = logger.meta_stats();
        assert_eq!(stats.free_count, 2);
        assert_eq!(stats.current_bytes, 0);
    }

    #[test]
    fn inline_space_is_not_reclaimed() {
        let mut storage = [MaybeUninit::<u8>::uninit(); 32];
        let mut stack = StackBuffer::new(&mut storage, HeapAllocator::new());

        let a = stack.allocate(8).unwrap();
        // SAFETY: Allocated above with the same size.
        unsafe {
            stack.deallocate(a, 8);
        }
        let b = stack.allocate(8).unwrap();

        assert_ne!(a, b);
        assert_eq!(stack.used(), 16);
    }

    #[test]
    fn empty_storage_always_spills() {
        let mut storage: [MaybeUninit<u8>; 0] = [];
        let mut stack = StackBuffer::new(&mut storage, HeapAllocator::new());

        let ptr = stack.allocate(0).unwrap();
        assert_eq!(stack.used(), 0);

        // SAFETY: Allocated above with the same size.
        unsafe {
            stack.deallocate(ptr, 0);
        }
    }

    #[test]
    fn regions_survive_moving_the_allocator() {
        fn fill(mut stack: StackBuffer<'_>) -> NonNull<u8> {
            let ptr = stack.allocate(4).unwrap();

            // SAFETY: The region is 4 bytes long and inside the borrowed buffer.
            unsafe {
                ptr.as_ptr().cast::<u32>().write_unaligned(0xDEAD_BEEF);
            }

            ptr
        }

        let mut storage = [MaybeUninit::<u8>::uninit(); 16];
        let stack = StackBuffer::new(&mut storage, HeapAllocator::new());
        let boxed = Box::new(stack);

        let ptr = fill(*boxed);

        // SAFETY: `storage` is still alive and has not been touched since the write.
        let value = unsafe { ptr.as_ptr().cast::<u32>().read_unaligned() };
        assert_eq!(value, 0xDEAD_BEEF);
    }

    #[test]
    fn forwards_checkpoints_to_backing() {
        let mut storage = [MaybeUninit::<u8>::uninit(); 16];
        let arena = ArenaAllocator::builder().build().unwrap();
        let mut stack = StackBuffer::new(&mut storage, arena);

        let spilled = {
            let mut scope = stack.scoped_checkpoint();
            scope.allocate(100).unwrap()
        };

        assert_eq!(stack.allocate(100).unwrap(), spilled);
        assert_eq!(stack.backing().block_count(), 1);
    }
}
