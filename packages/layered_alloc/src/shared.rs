use std::cell::{RefCell, RefMut};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::{ByteAllocator, Checkpoint, HeapAllocator, Result};

/// Shares one backing allocator between any number of call sites.
///
/// Every clone refers to the same backing instance, so containers that must draw from the same
/// arena or free list each get a clone. Clones compare equal exactly when they share the backing
/// instance, which makes memory obtained through one of them valid to return through another.
///
/// Shared allocators also implement [`allocator_api2::alloc::Allocator`], which lets typed
/// containers such as [`allocator_api2::vec::Vec`] or [`hashbrown::HashMap`] allocate through
/// them. Such containers must be dropped before a checkpoint restore or a clear releases the
/// memory they live in.
///
/// The backing allocator is dropped together with the last clone.
///
/// # Panics
///
/// Calls are forwarded through a [`RefCell`]. A backing allocator that calls back into a clone
/// of its own wrapper panics with a borrow error.
///
/// # Examples
///
/// ```
/// use layered_alloc::{ArenaAllocator, ByteAllocator, SharedAllocator};
///
/// let arena = ArenaAllocator::builder().build()?;
/// let mut first = SharedAllocator::new(arena);
/// let mut second = first.clone();
///
/// let a = first.allocate(8)?;
/// let b = second.allocate(8)?;
///
/// // Both draw from the same arena.
/// assert_eq!(b.addr().get(), a.addr().get() + 8);
/// assert_eq!(first, second);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
pub struct SharedAllocator<B: ByteAllocator = HeapAllocator> {
    inner: Rc<RefCell<B>>,
}

impl<B: ByteAllocator> SharedAllocator<B> {
    /// Takes ownership of `backing` and makes it shareable.
    #[must_use]
    pub fn new(backing: B) -> Self {
        Self {
            inner: Rc::new(RefCell::new(backing)),
        }
    }

    /// Whether `self` and `other` forward to the same backing instance.
    #[must_use]
    pub fn is_shared_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of clones, including `self`, that share the backing instance.
    #[must_use]
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Runs `f` with a shared reference to the backing allocator, for inspecting it.
    pub fn with_backing<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub(crate) fn backing_mut(&self) -> RefMut<'_, B> {
        self.inner.borrow_mut()
    }
}

impl<B: ByteAllocator> Clone for SharedAllocator<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: ByteAllocator> ByteAllocator for SharedAllocator<B> {
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.backing_mut().allocate(size)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: Forwarding safety requirements to the caller. Memory from any clone is memory
        // from the same backing instance.
        unsafe {
            self.backing_mut().deallocate(ptr, size);
        }
    }

    fn clear(&mut self) {
        self.backing_mut().clear();
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        self.inner.borrow().checkpoint()
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.backing_mut().restore(checkpoint);
    }
}

impl<B: ByteAllocator> PartialEq for SharedAllocator<B> {
    fn eq(&self, other: &Self) -> bool {
        self.is_shared_with(other)
    }
}

impl<B: ByteAllocator> Eq for SharedAllocator<B> {}
