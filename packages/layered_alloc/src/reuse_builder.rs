use std::num::NonZero;

use alloc_log::Logger;

use crate::{ByteAllocator, HeapAllocator, ReuseAllocator};

/// Builder for creating an instance of [`ReuseAllocator`].
///
/// The size class is mandatory and must be large enough to hold a pointer, since freed regions
/// store the free-list link in place. Use either `.size_class()` to provide a size or
/// `.size_class_of::<T>()` to use the size of a type.
///
/// # Examples
///
/// ```
/// use layered_alloc::{ArenaAllocator, ReuseAllocator};
///
/// let arena = ArenaAllocator::builder().build()?;
///
/// let reuse = ReuseAllocator::builder()
///     .size_class_of::<[u64; 4]>()
///     .backing(arena)
///     .build();
///
/// assert_eq!(reuse.size_class(), 32);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct ReuseAllocatorBuilder<B: ByteAllocator = HeapAllocator> {
    size_class: Option<NonZero<usize>>,
    logger: Logger,
    backing: B,
}

impl ReuseAllocatorBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            size_class: None,
            logger: Logger::detached(),
            backing: HeapAllocator::new(),
        }
    }
}

impl<B: ByteAllocator> ReuseAllocatorBuilder<B> {
    /// Sets the size class: the largest request served from the free list.
    ///
    /// # Panics
    ///
    /// Panics if the size class is smaller than a pointer.
    #[inline]
    pub fn size_class(mut self, size: NonZero<usize>) -> Self {
        assert!(
            size.get() >= size_of::<usize>(),
            "ReuseAllocator size class must be able to hold a pointer"
        );

        self.size_class = Some(size);
        self
    }

    /// Sets the size class to the size of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is smaller than a pointer.
    #[inline]
    pub fn size_class_of<T>(self) -> Self {
        let size = NonZero::new(size_of::<T>())
            .expect("ReuseAllocator size class must be able to hold a pointer");

        self.size_class(size)
    }

    /// Sets the logger that `allocate` and `deallocate` events are reported to.
    #[inline]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the allocator that regions are obtained from and returned to.
    #[inline]
    pub fn backing<C: ByteAllocator>(self, backing: C) -> ReuseAllocatorBuilder<C> {
        ReuseAllocatorBuilder {
            size_class: self.size_class,
            logger: self.logger,
            backing,
        }
    }

    /// Builds the allocator. No memory is obtained until the first request.
    ///
    /// # Panics
    ///
    /// Panics if no size class has been set using either [`size_class`](Self::size_class) or
    /// [`size_class_of`](Self::size_class_of).
    #[must_use]
    #[inline]
    pub fn build(self) -> ReuseAllocator<B> {
        let size_class = self
            .size_class
            .expect("size class must be set before calling build()");

        ReuseAllocator::new(size_class, self.logger, self.backing)
    }
}
