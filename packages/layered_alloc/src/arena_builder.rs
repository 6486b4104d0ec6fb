use std::num::NonZero;

use alloc_log::Logger;

use crate::{ArenaAllocator, ByteAllocator, DEFAULT_MIN_BLOCK_SIZE, HeapAllocator, Result};

/// Builder for creating an instance of [`ArenaAllocator`].
///
/// All settings are optional. By default the arena grows in blocks of 4096 bytes obtained from a
/// [`HeapAllocator`] and reports to a detached [`Logger`].
///
/// # Examples
///
/// ```
/// use alloc_log::{EventLog, Logger};
/// use layered_alloc::{ArenaAllocator, HeapAllocator};
/// use new_zealand::nz;
///
/// let logger = Logger::new(EventLog::with_tracing());
///
/// let arena = ArenaAllocator::builder()
///     .min_block_size(nz!(1024))
///     .logger(logger.clone())
///     .backing(HeapAllocator::with_logger(logger.clone()))
///     .build()?;
///
/// assert_eq!(arena.current_block_capacity(), 1024);
/// assert_eq!(logger.meta_stats().current_bytes, 1024);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct ArenaAllocatorBuilder<B: ByteAllocator = HeapAllocator> {
    min_block_size: NonZero<u32>,
    logger: Logger,
    backing: B,
}

impl ArenaAllocatorBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            logger: Logger::detached(),
            backing: HeapAllocator::new(),
        }
    }
}

impl<B: ByteAllocator> ArenaAllocatorBuilder<B> {
    /// Sets the size of the blocks the arena starts with and grows by.
    ///
    /// Requests larger than this get a dedicated block of their own size.
    #[inline]
    pub fn min_block_size(mut self, size: NonZero<u32>) -> Self {
        self.min_block_size = size;
        self
    }

    /// Sets the logger that `allocate` and `deallocate` events are reported to.
    ///
    /// This does not affect the backing allocator, which reports to its own logger.
    #[inline]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the allocator that blocks are obtained from.
    #[inline]
    pub fn backing<C: ByteAllocator>(self, backing: C) -> ArenaAllocatorBuilder<C> {
        ArenaAllocatorBuilder {
            min_block_size: self.min_block_size,
            logger: self.logger,
            backing,
        }
    }

    /// Builds the arena, obtaining its first block from the backing allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing allocator cannot provide the first block.
    #[inline]
    pub fn build(self) -> Result<ArenaAllocator<B>> {
        ArenaAllocator::new(self.min_block_size, self.logger, self.backing)
    }
}
