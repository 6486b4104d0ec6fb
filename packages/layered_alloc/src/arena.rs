use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use alloc_log::Logger;
use new_zealand::nz;
use tracing::{debug, trace};

use crate::{ArenaAllocatorBuilder, ByteAllocator, Checkpoint, Error, HeapAllocator, Result};

/// Global counter for generating unique arena IDs.
static ARENA_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique arena ID.
fn generate_arena_id() -> u64 {
    ARENA_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Largest single request an arena accepts. Block sizes are kept in a 32-bit range.
pub const MAX_ARENA_REQUEST: usize = u32::MAX as usize;

/// Size of the blocks an arena grows by unless configured otherwise.
pub(crate) const DEFAULT_MIN_BLOCK_SIZE: NonZero<u32> = nz!(4096);

/// A region obtained from the backing allocator, linked into the arena's block chain.
///
/// Links are indices into the arena's block vector. Indices are stable until the arena is
/// cleared, which is also when every outstanding checkpoint becomes invalid.
#[derive(Debug)]
struct Block {
    region: NonNull<u8>,
    size: usize,
    next: Option<usize>,
    previous: Option<usize>,
}

/// Bump allocator over a chain of blocks, with O(1) checkpoint and rewind.
///
/// Allocation carves consecutive bytes out of the current block. When the current block is
/// exhausted the cursor moves on to the next block in the chain, and a new block of the minimum
/// size is appended once the chain runs out. A request too large for a minimum-size block gets a
/// dedicated block of exactly its size, inserted before the current block; the cursor stays where
/// it was.
///
/// Deallocation does nothing beyond reporting the event. Memory comes back in bulk, either by
/// [restoring a checkpoint][ByteAllocator::restore] (which rewinds the cursor and keeps every
/// block for reuse) or by [clearing][ByteAllocator::clear] the arena (which returns every block
/// but one to the backing allocator).
///
/// The block kept by a clear is the head of the chain, which is not necessarily a minimum-size
/// block: when the very first allocation is oversized, its dedicated block is inserted before the
/// initial block and becomes the head, so a clear keeps the oversized block and returns the
/// initial one.
///
/// Regions are carved at byte granularity, so only the first region of each block carries the
/// backing allocator's alignment.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use layered_alloc::{ArenaAllocator, ByteAllocator};
///
/// let mut arena = ArenaAllocator::builder()
///     .min_block_size(NonZero::new(256).unwrap())
///     .build()?;
///
/// let a = arena.allocate(100)?;
/// let b = arena.allocate(100)?;
/// assert_eq!(b.addr().get(), a.addr().get() + 100);
///
/// // Does not fit into the remaining 56 bytes, so the arena grows.
/// arena.allocate(100)?;
/// assert_eq!(arena.block_count(), 2);
///
/// arena.clear();
/// assert_eq!(arena.block_count(), 1);
/// # Ok::<(), layered_alloc::Error>(())
/// ```
#[derive(Debug)]
pub struct ArenaAllocator<B: ByteAllocator = HeapAllocator> {
    blocks: Vec<Block>,

    /// Index of the block the cursor is in.
    current: usize,

    /// Offset of the cursor within the current block. Never above the block size.
    offset: usize,

    min_block_size: usize,

    arena_id: u64,

    /// Incremented by every clear, which invalidates all outstanding checkpoints.
    generation: u64,

    logger: Logger,
    backing: B,
}

impl ArenaAllocator {
    /// Creates a builder for configuring and constructing an [`ArenaAllocator`].
    ///
    /// # Examples
    ///
    /// ```
    /// use layered_alloc::ArenaAllocator;
    ///
    /// let arena = ArenaAllocator::builder().build()?;
    /// assert_eq!(arena.block_count(), 1);
    /// # Ok::<(), layered_alloc::Error>(())
    /// ```
    #[inline]
    pub fn builder() -> ArenaAllocatorBuilder {
        ArenaAllocatorBuilder::new()
    }
}

impl<B: ByteAllocator> ArenaAllocator<B> {
    pub(crate) fn new(min_block_size: NonZero<u32>, logger: Logger, mut backing: B) -> Result<Self> {
        let min_block_size = min_block_size.get() as usize;

        let region = backing.allocate(min_block_size)?;

        let arena_id = generate_arena_id();
        debug!(arena_id, min_block_size, "arena created");

        Ok(Self {
            blocks: vec![Block {
                region,
                size: min_block_size,
                next: None,
                previous: None,
            }],
            current: 0,
            offset: 0,
            min_block_size,
            arena_id,
            generation: 0,
            logger,
            backing,
        })
    }

    /// Number of blocks currently owned by the arena.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Size of the block the cursor is in.
    #[must_use]
    pub fn current_block_capacity(&self) -> usize {
        self.current_block().size
    }

    /// Bytes left in the current block before the arena has to move on to another block.
    #[must_use]
    pub fn remaining_in_current_block(&self) -> usize {
        // The cursor never moves past the end of its block.
        self.current_block().size.saturating_sub(self.offset)
    }

    /// Size of the blocks the arena grows by.
    #[must_use]
    pub fn min_block_size(&self) -> usize {
        self.min_block_size
    }

    /// The logger this arena reports to.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The allocator that blocks are obtained from.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    fn current_block(&self) -> &Block {
        self.block(self.current)
    }

    fn block(&self, index: usize) -> &Block {
        self.blocks
            .get(index)
            .expect("block links always point at blocks owned by the arena")
    }

    fn block_mut(&mut self, index: usize) -> &mut Block {
        self.blocks
            .get_mut(index)
            .expect("block links always point at blocks owned by the arena")
    }

    /// Appends a minimum-size block after the current one and moves the cursor onto it.
    fn append_block(&mut self) -> Result<()> {
        let region = self.backing.allocate(self.min_block_size)?;

        let index = self.blocks.len();
        self.blocks.push(Block {
            region,
            size: self.min_block_size,
            next: None,
            previous: Some(self.current),
        });
        self.block_mut(self.current).next = Some(index);

        self.current = index;
        self.offset = 0;

        debug!(
            arena_id = self.arena_id,
            block_size = self.min_block_size,
            block_count = self.blocks.len(),
            "arena grew"
        );

        Ok(())
    }

    /// Inserts a block of exactly `size` bytes before the current one and returns its region.
    ///
    /// The cursor does not move.
    fn insert_oversized_block(&mut self, size: usize) -> Result<NonNull<u8>> {
        let region = self.backing.allocate(size)?;

        let index = self.blocks.len();
        let previous = self.current_block().previous;

        self.blocks.push(Block {
            region,
            size,
            next: Some(self.current),
            previous,
        });

        if let Some(previous) = previous {
            self.block_mut(previous).next = Some(index);
        }

        let current = self.current;
        self.block_mut(current).previous = Some(index);

        trace!(
            arena_id = self.arena_id,
            block_size = size,
            block_count = self.blocks.len(),
            "arena inserted oversized block"
        );

        Ok(region)
    }

    fn release_block(&mut self, index: usize) {
        let (region, size) = {
            let block = self.block(index);
            (block.region, block.size)
        };

        // SAFETY: The region was obtained from the backing allocator with this size and is
        // released exactly once, since the block is dropped from the chain right after.
        unsafe {
            self.backing.deallocate(region, size);
        }
    }
}

impl<B: ByteAllocator> ByteAllocator for ArenaAllocator<B> {
    #[cfg_attr(test, mutants::skip)] // Some mutations grow the chain forever.
    fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        if size > MAX_ARENA_REQUEST {
            return Err(Error::SizeOverflow {
                requested: size,
                max: MAX_ARENA_REQUEST,
            });
        }

        let ptr = loop {
            let block = self.current_block();
            let end = self.offset.saturating_add(size);

            if end <= block.size {
                // SAFETY: `offset + size` is within the block, so the result is at most one past
                // the end of the region and cannot be null.
                let ptr = unsafe { block.region.add(self.offset) };
                self.offset = end;
                break ptr;
            }

            if self.offset == 0 && size > self.min_block_size {
                break self.insert_oversized_block(size)?;
            }

            if let Some(next) = block.next {
                self.current = next;
                self.offset = 0;
                continue;
            }

            self.append_block()?;
        };

        self.logger.allocate(ptr.addr().get(), size);

        Ok(ptr)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        // Space is only reclaimed in bulk.
        self.logger.deallocate(ptr.addr().get(), size);
    }

    /// Returns every block except the head of the chain to the backing allocator and moves the
    /// cursor to the start of the head block.
    ///
    /// If the first allocation of the arena was oversized, the head is that oversized block and
    /// its full capacity remains available after the clear.
    fn clear(&mut self) {
        // Successors of the current block go first, then its predecessors, keeping the head.
        let mut next = self.current_block().next;
        while let Some(index) = next {
            next = self.block(index).next;
            self.release_block(index);
        }

        let mut head = self.current;
        while let Some(previous) = self.block(head).previous {
            self.release_block(head);
            head = previous;
        }

        let released = self.blocks.len().saturating_sub(1);

        let head = self.blocks.swap_remove(head);
        self.blocks.clear();
        self.blocks.push(Block {
            next: None,
            previous: None,
            ..head
        });

        self.current = 0;
        self.offset = 0;
        self.generation = self.generation.wrapping_add(1);

        debug!(
            arena_id = self.arena_id,
            released_blocks = released,
            retained_block_size = self.current_block().size,
            "arena cleared"
        );
    }

    fn checkpoint(&self) -> Option<Checkpoint> {
        Some(Checkpoint::new(
            self.arena_id,
            self.generation,
            self.current,
            self.offset,
        ))
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        assert!(
            checkpoint.arena_id == self.arena_id,
            "attempted to restore a checkpoint taken on a different arena (checkpoint arena ID: {}, current arena ID: {})",
            checkpoint.arena_id,
            self.arena_id
        );

        assert!(
            checkpoint.generation == self.generation,
            "attempted to restore a checkpoint taken before the arena was cleared"
        );

        self.current = checkpoint.block;
        self.offset = checkpoint.offset;
    }
}

impl<B: ByteAllocator> Drop for ArenaAllocator<B> {
    fn drop(&mut self) {
        let blocks = mem::take(&mut self.blocks);

        for block in blocks {
            // SAFETY: Every block region was obtained from the backing allocator with this size
            // and is released exactly once, here.
            unsafe {
                self.backing.deallocate(block.region, block.size);
            }
        }
    }
}
