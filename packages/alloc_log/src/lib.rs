#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Bounded, self-compacting log of allocation traffic.
//!
//! Allocators that want to report what they do hand every event to an [`EventLog`], usually
//! through a cloneable [`Logger`] handle. The log keeps the most recent events in a tiny ring
//! buffer of [`RING_CAPACITY`] entries and compacts them as they arrive:
//!
//! * A `malloc` immediately followed by an `allocate` of the same address is fused into a single
//!   `malloc+allocate` entry, and a `deallocate` followed by a `free` of the same address into
//!   `free+deallocate`.
//! * Consecutive entries with the same kind and size collapse into one entry with a repeat count.
//!
//! Entries that can no longer be compacted leave the ring buffer through an [`EntrySink`]. The
//! default sink, [`TracingSink`], emits them as structured `tracing` events.
//!
//! Independently of the detailed log, which starts out disabled, every `malloc` and `free`
//! updates a set of [`MetaStats`] (counts, outstanding bytes and the peak of outstanding bytes).
//!
//! The log never allocates while recording, so it can sit underneath the allocators it observes.
//!
//! # Examples
//!
//! ```
//! use alloc_log::{EventLog, RING_CAPACITY};
//!
//! let mut log = EventLog::with_tracing();
//! log.set_enabled(true);
//!
//! for i in 0..5 {
//!     log.deallocate(0x1000 + i * 8, 8);
//! }
//!
//! // The run has been partially collapsed to stay within the ring buffer.
//! assert!(log.pending() < RING_CAPACITY);
//!
//! log.flush(true);
//! assert_eq!(log.pending(), 0);
//! ```

mod entry;
mod event_log;
mod logger;
mod sink;
mod stats;

pub use entry::*;
pub use event_log::*;
pub use logger::*;
pub use sink::*;
pub use stats::*;
