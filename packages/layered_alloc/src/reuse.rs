use std::num::NonZero;
use std::ptr::NonNull;

use alloc_log::Logger;
use tracing::trace;

use crate::{ByteAllocator, Checkpoint, HeapAllocator, Result, ReuseAllocatorBuilder};

/// Link stored in the first bytes of every region on the free list.
type FreeLink = Option<NonNull<u8>>;

/// Recycles regions of one fixed size through an intrusive free list.
///
/// Requests of at most [`size_class()`][Self::size_class] bytes are served from the free list
/// when it is non-empty, without touching the backing allocator. When the list is empty, the
/// backing allocator is asked for a full size-class region, never for less, so every region on
/// the list can serve every eligible request. Larger requests go straight to the backing
/// allocator.
///
/// Deallocated regions of eligible size are pushed onto the free list, which lives inside the
/// freed memory itself: the first pointer-sized bytes of each region link to the next one.
///
/// Clearing or dropping the allocator returns every region on the free list to the backing
/// allocator. Restoring a checkpoint of the backing allocator through this allocator forgets the
/// free list first, because its regions may lie in memory that the restore rewinds. The whole
/// list is dropped, including regions that were freed before the checkpoint was taken, so
/// nothing is recycled across a restore. A reuse allocator that serves a scoped arena therefore
/// starts every scope with an empty free list.
///
/// # Examples
///
/// ```
/// use layered_alloc::{ByteAllocator, ReuseAllocator};
/// use new_zealand::nz;
///
/// let mut reuse = ReuseAllocator::builder().size_class(nz!(32)).build();
///
/// let first = reuse.allocate(24)?;
/// // SAFETY: Allocated above with the same size.
/// unsafe { reuse.deallocate(first, 24) };
///
/// // The region is recycled for the next eligible request.
/// let second = reuse.allocate(32)?;
/// assert_eq!(first, second);
/// # // SAFETY: Allocated above with the same size.
/// # unsafe { reuse.deallocate(second, 32) };
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
pub struct ReuseAllocator<B: ByteAllocator = HeapAllocator> {
    size_class: usize,
    free_head: FreeLink,
    free_len: usize,
    logger: Logger,
    backing: B,
}

impl ReuseAllocator {
    /// Creates a builder for configuring and constructing a [`ReuseAllocator`].
    ///
    /// The size class is mandatory.
    #[inline]
    pub fn builder() -> ReuseAllocatorBuilder {
        ReuseAllocatorBuilder::new()
    }
}

impl<B: ByteAllocator> ReuseAllocator<B> {
    pub(crate) fn new(size_class: NonZero<usize>, logger: Logger, backing: B) -> Self {
        Self {
            size_class: size_class.get(),
            free_head: None,
            free_len: 0,
            logger,
            backing,
        }
    }

    /// The largest request served from the free list, which is also the size of every region
    /// on it.
    #[must_use]
    pub fn size_class(&self) -> usize {
        self.size_class
    }

    /// Number of regions currently waiting on the free list.
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free_len
    }

    /// The logger this allocator reports to.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The allocator that regions are obtained from.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    fn pop_free(&mut self) -> Option<NonNull<u8>> {
        let head = self.free_head?;

        // SAFETY: Every region on the free list is at least a size class long, which holds a
        // link, and had a link written into it when it was pushed. No alignment is assumed.
        self.free_head = unsafe { head.as_ptr().cast::<FreeLink>().read_unaligned() };
        self.free_len = self.free_len.wrapping_sub(1);

        Some(head)
    }

    /// # Safety
    ///
    /// `region` must be at least a size class long, exclusively owned by the caller and not
    /// already on the free list.
    unsafe fn push_free(&mut self, region: NonNull<u8>) {
        // SAFETY: Forwarding the length and ownership guarantees from the caller.
        unsafe {
            region.as_ptr().cast::<FreeLink>().write_unaligned(self.free_head);
        }

        self.free_head = Some(region);
        self.free_len = self.free_len.wrapping_add(1);
    }

    fn release_free_list(&mut self) {
        while let Some(region) = self.pop_free() {
            self.logger.deallocate(region.addr().get(), self.size_class);

            // SAFETY: Regions only reach the free list after being obtained from the backing
            // allocator with the size class (eligible requests are always served at that size).
            unsafe {
                self.backing.deallocate(region, self.size_class);
            }
        }
    }
}

impl<B: ByteAllocator> ByteAllocator for ReuseAllocator<B> {
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let ptr = if size <= self.size_class {
            match self.pop_free() {
                Some(region) => region,
                None => self.backing.allocate(self.size_class)?,
            }
        } else {
            self.backing.allocate(size)?
        };

        self.logger.allocate(ptr.addr().get(), size);

        Ok(ptr)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        if size <= self.size_class {
            self.logger.deallocate(ptr.addr().get(), self.size_class);

            // SAFETY: Eligible requests are always served with a full size class and the caller
            // guarantees the region is theirs and not deallocated twice.
            unsafe {
                self.push_free(ptr);
            }
        } else {
            self.logger.deallocate(ptr.addr().get(), size);

            // SAFETY: Larger requests came straight from the backing allocator with this size.
            unsafe {
                self.backing.deallocate(ptr, size);
            }
        }
    }

    fn clear(&mut self) {
        self.release_free_list();
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        self.backing.checkpoint()
    }

    /// Drops the entire free list, then restores `checkpoint` on the backing allocator.
    ///
    /// Regions freed before the checkpoint was taken are dropped as well. They are not returned
    /// to the backing allocator.
    fn restore(&mut self, checkpoint: Checkpoint) {
        if self.free_len > 0 {
            trace!(
                forgotten = self.free_len,
                size_class = self.size_class,
                "free list dropped for checkpoint restore"
            );
        }

        self.free_head = None;
        self.free_len = 0;

        self.backing.restore(checkpoint);
    }
}

impl<B: ByteAllocator> Drop for ReuseAllocator<B> {
    fn drop(&mut self) {
        self.release_free_list();
    }
}
