#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Composable byte allocators that report their traffic into an [`alloc_log`] event log.
//!
//! Every strategy implements [`ByteAllocator`], and most of them are generic over another
//! `ByteAllocator` they fall back to, so strategies stack:
//!
//! * [`ArenaAllocator`] bump-allocates from a chain of blocks and supports O(1)
//!   [checkpoints][ByteAllocator::scoped_checkpoint] that rewind every allocation made since.
//! * [`ReuseAllocator`] recycles regions of one size class through an intrusive free list.
//! * [`StackBuffer`] carves regions out of a borrowed fixed buffer, spilling over to its backing
//!   allocator once the buffer is exhausted.
//! * [`PassThrough`] forwards everything, reporting the traffic on the way.
//! * [`SharedAllocator`] lets several call sites draw from one backing instance. It also
//!   implements [`allocator_api2::alloc::Allocator`], so typed containers such as
//!   [`allocator_api2::vec::Vec`] and [`hashbrown::HashMap`] can allocate through any stack.
//! * [`HeapAllocator`] sits at the bottom of every stack and takes memory from the global
//!   allocator.
//!
//! Wrapping never hides a checkpoint: every forwarding strategy forwards checkpoint operations to
//! its backing allocator.
//!
//! Allocators report `allocate` and `deallocate` events (and the heap allocator `malloc` and
//! `free` events) to an [`alloc_log::Logger`], which compacts them and keeps aggregate heap
//! statistics. A detached logger, the default, records nothing.
//!
//! All allocators are single-threaded.
//!
//! # Examples
//!
//! A free list for 32-byte nodes on top of an arena, with logging:
//!
//! ```
//! use alloc_log::{EventLog, Logger};
//! use layered_alloc::{ArenaAllocator, ByteAllocator, HeapAllocator, ReuseAllocator};
//! use new_zealand::nz;
//!
//! let logger = Logger::new(EventLog::with_tracing());
//!
//! let arena = ArenaAllocator::builder()
//!     .min_block_size(nz!(1024))
//!     .backing(HeapAllocator::with_logger(logger.clone()))
//!     .build()?;
//!
//! let mut nodes = ReuseAllocator::builder()
//!     .size_class(nz!(32))
//!     .logger(logger.clone())
//!     .backing(arena)
//!     .build();
//!
//! {
//!     let mut scope = nodes.scoped_checkpoint();
//!
//!     for _ in 0..100 {
//!         scope.allocate(32)?;
//!     }
//! }
//!
//! // The arena grew to hold 100 nodes, then everything was rewound.
//! assert!(nodes.backing().block_count() > 1);
//! assert_eq!(nodes.backing().remaining_in_current_block(), 1024);
//! assert_eq!(logger.meta_stats().malloc_count, nodes.backing().block_count());
//! # Ok::<(), layered_alloc::Error>(())
//! ```

mod allocator;
mod arena;
mod arena_builder;
mod checkpoint;
mod error;
mod heap;
mod pass_through;
mod reuse;
mod reuse_builder;
mod shared;
mod stack_buffer;
#[cfg(test)]
mod testing;
mod typed;
pub mod workloads;

pub use allocator::*;
pub use arena::*;
pub use arena_builder::*;
pub use checkpoint::*;
pub use error::*;
pub use heap::*;
pub use pass_through::*;
pub use reuse::*;
pub use reuse_builder::*;
pub use shared::*;
pub use stack_buffer::*;
