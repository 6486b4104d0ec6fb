//! Typed containers on top of the byte-granular strategies.
//!
//! [`SharedAllocator`] implements [`Allocator`], so any container written against
//! `allocator_api2` can allocate through a stack of strategies. Strategies carve regions at byte
//! granularity, so every request with an alignment above one is padded: the region is shifted up
//! to the requested alignment and the shift is stored in the bytes right before the aligned
//! address, where deallocation finds it again.

use std::alloc::Layout;
use std::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{ByteAllocator, SharedAllocator};

const SHIFT_SIZE: usize = size_of::<usize>();

/// Number of bytes requested from the backing allocator for `layout`.
fn padded_size(layout: Layout) -> Option<usize> {
    if layout.align() == 1 {
        return Some(layout.size());
    }

    layout
        .size()
        .checked_add(layout.align())?
        .checked_add(SHIFT_SIZE)
}

/// Distance from `region` to the first address that is aligned to `align` and leaves room for
/// the stored shift in front of it. Between `SHIFT_SIZE` and `SHIFT_SIZE + align - 1`.
fn shift_for(region: NonNull<u8>, align: usize) -> usize {
    let after_shift = region.addr().get().wrapping_add(SHIFT_SIZE);
    let adjustment = after_shift.wrapping_neg() & align.wrapping_sub(1);

    SHIFT_SIZE.wrapping_add(adjustment)
}

// SAFETY: Regions stay valid until they are deallocated, as long as the caller does not rewind
// or clear a strategy underneath live containers (the same contract as for raw regions). Every
// clone forwards to the same backing instance, so memory from one clone can be returned through
// another, and moving the handle does not move any memory.
unsafe impl<B: ByteAllocator> Allocator for SharedAllocator<B> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let padded = padded_size(layout).ok_or(AllocError)?;

        let region = self
            .backing_mut()
            .allocate(padded)
            .map_err(|_error| AllocError)?;

        if layout.align() == 1 {
            return Ok(NonNull::slice_from_raw_parts(region, layout.size()));
        }

        let shift = shift_for(region, layout.align());

        // SAFETY: The shift is at most `SHIFT_SIZE + align - 1`, so the aligned address and the
        // `layout.size()` bytes after it lie inside the padded region.
        let aligned = unsafe { region.add(shift) };

        // SAFETY: The shift is at least `SHIFT_SIZE`, so the bytes right before the aligned
        // address are inside the padded region and not part of what the caller receives.
        let shift_slot = unsafe { aligned.sub(SHIFT_SIZE) };

        // SAFETY: See above. No alignment is assumed for the slot.
        unsafe {
            shift_slot.cast::<usize>().write_unaligned(shift);
        }

        Ok(NonNull::slice_from_raw_parts(aligned, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let Some(padded) = padded_size(layout) else {
            unreachable!("a layout that could not be padded could never have been allocated");
        };

        let region = if layout.align() == 1 {
            ptr
        } else {
            // SAFETY: The caller guarantees `ptr` came from `allocate()` with this layout, which
            // stored the shift in the bytes right before it.
            let shift_slot = unsafe { ptr.sub(SHIFT_SIZE) };

            // SAFETY: See above.
            let shift = unsafe { shift_slot.cast::<usize>().read_unaligned() };

            // SAFETY: Undoing the shift applied in `allocate()` leads back to the start of the
            // padded region.
            unsafe { ptr.sub(shift) }
        };

        // SAFETY: The padded region was obtained from the backing allocator with this size.
        unsafe {
            self.backing_mut().deallocate(region, padded);
        }
    }
}
