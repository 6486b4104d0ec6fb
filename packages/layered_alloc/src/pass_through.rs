use std::ptr::NonNull;

use alloc_log::Logger;

use crate::{ByteAllocator, Checkpoint, HeapAllocator, Result};

/// Forwards every call to a backing allocator it owns, reporting the traffic on the way.
///
/// Adds no policy of its own. It is the simplest layer to put between a call site and another
/// allocator when only the `allocate`/`deallocate` events of that call site are of interest.
///
/// Two pass-through allocators compare equal when their backing allocators do.
///
/// # Examples
///
/// ```
/// use alloc_log::{EventLog, Logger};
/// use layered_alloc::{ByteAllocator, HeapAllocator, PassThrough};
///
/// let logger = Logger::new(EventLog::with_tracing());
/// let mut allocator = PassThrough::with_logger(HeapAllocator::new(), logger);
///
/// let ptr = allocator.allocate(64)?;
/// // SAFETY: Allocated above with the same size.
/// unsafe { allocator.deallocate(ptr, 64) };
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct PassThrough<B: ByteAllocator = HeapAllocator> {
    logger: Logger,
    backing: B,
}

impl<B: ByteAllocator> PassThrough<B> {
    /// Wraps `backing` without reporting anything.
    #[must_use]
    pub fn new(backing: B) -> Self {
        Self::with_logger(backing, Logger::detached())
    }

    /// Wraps `backing`, reporting every allocation and deallocation to `logger`.
    #[must_use]
    pub fn with_logger(backing: B, logger: Logger) -> Self {
        Self { logger, backing }
    }

    /// The logger this allocator reports to.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The wrapped allocator.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Unwraps the backing allocator.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.backing
    }
}

impl<B: ByteAllocator> ByteAllocator for PassThrough<B> {
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let ptr = self.backing.allocate(size)?;
        self.logger.allocate(ptr.addr().get(), size);
        Ok(ptr)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        self.logger.deallocate(ptr.addr().get(), size);

        // SAFETY: Forwarding safety requirements to the caller.
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

impl<B: ByteAllocator + PartialEq> PartialEq for PassThrough<B> {
    fn eq(&self, other: &Self) -> bool {
        self.backing == other.backing
    }
}

impl<B: ByteAllocator + Eq> Eq for PassThrough<B> {}
