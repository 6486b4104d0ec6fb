use std::fmt::Debug;

use tracing::info;

use crate::LogEntry;

/// Destination for entries that leave the [`EventLog`][crate::EventLog] ring buffer.
///
/// The event log calls into the sink while it is in the middle of recording allocation
/// traffic, so implementations must not allocate through an allocator that reports into the
/// same log.
#[cfg_attr(test, mockall::automock)]
pub trait EntrySink: Debug {
    /// Receives one entry that has been compacted as far as the ring buffer allows.
    fn emit(&mut self, entry: &LogEntry);
}

/// Emits every entry as a structured `tracing` event at INFO level.
///
/// This is the sink used by [`EventLog::with_tracing()`][crate::EventLog::with_tracing].
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EntrySink for TracingSink {
    fn emit(&mut self, entry: &LogEntry) {
        info!(
            kind = %entry.kind,
            repeat = entry.repeat,
            size = entry.size,
            total = entry.total_bytes(),
            address = entry.address,
            "allocation traffic"
        );
    }
}
