use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use alloc_log::Logger;

use crate::{ByteAllocator, Error, Result};

/// Alignment of every region the heap allocator hands out.
pub const HEAP_ALIGNMENT: usize = 16;

/// Largest request the heap allocator accepts.
pub const MAX_HEAP_REQUEST: usize = isize::MAX.unsigned_abs() - (HEAP_ALIGNMENT - 1);

/// The allocator at the bottom of every stack: takes memory from the global Rust allocator.
///
/// Every region is aligned to [`HEAP_ALIGNMENT`]. Size-zero requests are served as one byte so
/// that every returned address is distinct and can be deallocated normally.
///
/// This is the only allocator in the crate that reports `malloc` and `free` events, so the heap
/// statistics of the attached [`Logger`] describe exactly the memory it holds.
///
/// All heap allocators are interchangeable: memory obtained from one may be returned through
/// another.
///
/// # Examples
///
/// ```
/// use alloc_log::{EventLog, Logger};
/// use layered_alloc::{ByteAllocator, HeapAllocator};
///
/// let logger = Logger::new(EventLog::with_tracing());
/// let mut heap = HeapAllocator::with_logger(logger.clone());
///
/// let ptr = heap.allocate(256)?;
/// assert_eq!(logger.meta_stats().current_bytes, 256);
///
/// // SAFETY: Allocated above with the same size.
/// unsafe { heap.deallocate(ptr, 256) };
/// assert_eq!(logger.meta_stats().current_bytes, 0);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct HeapAllocator {
    logger: Logger,
}

impl HeapAllocator {
    /// Creates a heap allocator that reports nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a heap allocator that reports its traffic to `logger`.
    #[must_use]
    pub fn with_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// The logger this allocator reports to.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size.max(1), HEAP_ALIGNMENT).map_err(|_layout_error| {
            Error::SizeOverflow {
                requested: size,
                max: MAX_HEAP_REQUEST,
            }
        })
    }
}

impl ByteAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let layout = Self::layout(size)?;

        // SAFETY: The layout has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or(Error::Exhausted { size })?;

        self.logger.malloc(ptr.addr().get(), size);

        Ok(ptr)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        self.logger.free(ptr.addr().get(), size);

        // The caller guarantees `size` is what was passed to `allocate()`, which succeeded in
        // building a layout from it.
        let Ok(layout) = Self::layout(size) else {
            unreachable!("a region of {size} bytes could never have been allocated");
        };

        // SAFETY: The caller guarantees that `ptr` came from `allocate()` with the same size,
        // so it was allocated by the global allocator with this exact layout.
        unsafe {
            dealloc(ptr.as_ptr(), layout);
        }
    }
}

impl PartialEq for HeapAllocator {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for HeapAllocator {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use alloc_log::EventLog;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(HeapAllocator: ByteAllocator, Clone, Default, Eq);
    assert_not_impl_any!(HeapAllocator: Send, Sync);

    #[test]
    fn regions_are_aligned_and_writable() {
        let mut heap = HeapAllocator::new();

        let ptr = heap.allocate(100).unwrap();
        assert_eq!(ptr.addr().get() % HEAP_ALIGNMENT, 0);

        // SAFETY: The region is 100 bytes long and exclusively ours.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 100);
        }

        // SAFETY: Allocated above with the same size.
        unsafe {
            heap.deallocate(ptr, 100);
        }
    }

    #[test]
    fn zero_size_requests_get_distinct_addresses() {
        let mut heap = HeapAllocator::new();

        let a = heap.allocate(0).unwrap();
        let b = heap.allocate(0).unwrap();
        assert_ne!(a, b);

        // SAFETY: Both were allocated above with size zero.
        unsafe {
            heap.deallocate(a, 0);
        }

        // SAFETY: See above.
        unsafe {
            heap.deallocate(b, 0);
        }
    }

    #[test]
    fn oversized_request_is_rejected() {
        let mut heap = HeapAllocator::new();

        let error = heap.allocate(usize::MAX).unwrap_err();

        assert_eq!(
            error,
            Error::SizeOverflow {
                requested: usize::MAX,
                max: MAX_HEAP_REQUEST,
            }
        );
    }

    #[test]
    fn reports_malloc_and_free() {
        let logger = Logger::new(EventLog::with_tracing());
        let mut heap = HeapAllocator::with_logger(logger.clone());

        let a = heap.allocate(16).unwrap();
        let b = heap.allocate(32).unwrap();

        // SAFETY: Allocated above with the same size.
        unsafe {
            heap.deallocate(a, 16);
        }

        let stats = logger.meta_stats();
        assert_eq!(stats.malloc_count, 2);
        assert_eq!(stats.free_count, 1);
        assert_eq!(stats.peak_bytes, 48);
        assert_eq!(stats.current_bytes, 32);

        // SAFETY: Allocated above with the same size.
        unsafe {
            heap.deallocate(b, 32);
        }
    }

    #[test]
    fn all_instances_are_interchangeable() {
        let logger = Logger::new(EventLog::with_tracing());

        assert_eq!(HeapAllocator::new(), HeapAllocator::with_logger(logger));
    }
}
