use std::fmt;

use tracing::info;

use crate::{EntrySink, EventKind, LogEntry, MetaStats, TracingSink};

/// Number of entries the ring buffer holds before it is forced to emit.
///
/// Kept a power of two so that the ring positions stay consistent when the
/// monotonically increasing write index wraps around.
pub const RING_CAPACITY: usize = 4;

const _: () = assert!(RING_CAPACITY.is_power_of_two());

const EMPTY_ENTRY: LogEntry = LogEntry::single(EventKind::Allocate, 0, 0);

/// Records allocation traffic into a small ring buffer, compacting it on the fly.
///
/// Every recorded event goes through two compaction passes before anything is emitted:
///
/// 1. Newest-first fusion: a `malloc` immediately followed by an `allocate` of the same
///    address becomes a single `malloc+allocate` entry, and likewise a `deallocate`
///    followed by a `free` becomes `free+deallocate`.
/// 2. Oldest-first draining, which only runs when the buffer is full or when a flush is
///    forced: neighbouring entries of the same kind and size collapse into one entry with a
///    higher repeat count, and whatever cannot collapse is handed to the [`EntrySink`].
///
/// The log never allocates. Its memory use is bounded by [`RING_CAPACITY`] regardless of
/// how long the traced workload runs.
///
/// Heap statistics (see [`MetaStats`]) are updated on every `malloc` and `free` event even when
/// detailed logging is disabled. Detailed logging starts out disabled.
///
/// Pending entries are force-flushed when the log is dropped.
///
/// # Examples
///
/// ```
/// use alloc_log::EventLog;
///
/// let mut log = EventLog::with_tracing();
/// log.set_enabled(true);
///
/// log.malloc(0x1000, 64);
/// log.allocate(0x1000, 64);
///
/// // The pair has been fused into a single pending entry.
/// assert_eq!(log.pending(), 1);
///
/// log.flush(true);
/// assert_eq!(log.pending(), 0);
/// assert_eq!(log.meta_stats().peak_bytes, 64);
/// ```
pub struct EventLog {
    entries: [LogEntry; RING_CAPACITY],

    /// Index of the oldest pending entry. Never ahead of `write_index`.
    read_index: usize,

    /// Index the next entry will be written to. Only moves backwards when fusion absorbs the
    /// newest entry into its predecessor.
    write_index: usize,

    stats: MetaStats,
    enabled: bool,
    sink: Box<dyn EntrySink>,
}

impl EventLog {
    /// Creates an event log that hands compacted entries to `sink`.
    #[must_use]
    pub fn new(sink: impl EntrySink + 'static) -> Self {
        Self {
            entries: [EMPTY_ENTRY; RING_CAPACITY],
            read_index: 0,
            write_index: 0,
            stats: MetaStats::default(),
            enabled: false,
            sink: Box::new(sink),
        }
    }

    /// Creates an event log that emits compacted entries as `tracing` events.
    #[must_use]
    pub fn with_tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Turns detailed (per-event) logging on or off.
    ///
    /// Heap statistics are maintained either way. Entries already buffered stay buffered until
    /// the next flush.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether detailed logging is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records memory obtained from the heap.
    pub fn malloc(&mut self, address: usize, size: usize) {
        self.stats.record_malloc(size);
        self.record(EventKind::Malloc, address, size);
    }

    /// Records memory returned to the heap.
    pub fn free(&mut self, address: usize, size: usize) {
        self.stats.record_free(size);
        self.record(EventKind::Free, address, size);
    }

    /// Records memory handed out by an allocation strategy.
    pub fn allocate(&mut self, address: usize, size: usize) {
        self.record(EventKind::Allocate, address, size);
    }

    /// Records memory taken back by an allocation strategy.
    pub fn deallocate(&mut self, address: usize, size: usize) {
        self.record(EventKind::Deallocate, address, size);
    }

    /// Compacts the buffered entries and emits those that have to leave the buffer.
    ///
    /// Without `force`, entries are only emitted while the buffer is full. With `force`, the
    /// buffer is drained completely. Forcing a flush on an empty buffer emits nothing.
    pub fn flush(&mut self, force: bool) {
        self.fuse_newest();
        self.drain(force);
    }

    /// Returns a snapshot of the aggregate heap statistics.
    #[must_use]
    pub fn meta_stats(&self) -> MetaStats {
        self.stats
    }

    /// Zeroes the aggregate heap statistics. Buffered entries are left alone.
    pub fn reset_meta_stats(&mut self) {
        self.stats = MetaStats::default();
    }

    /// Emits the aggregate heap statistics as a `tracing` event.
    pub fn log_meta_stats(&self) {
        info!(
            malloc_count = self.stats.malloc_count,
            free_count = self.stats.free_count,
            current_bytes = self.stats.current_bytes,
            peak_bytes = self.stats.peak_bytes,
            "allocation totals: {}",
            self.stats
        );
    }

    /// Number of entries currently buffered and not yet emitted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.write_index.wrapping_sub(self.read_index)
    }

    /// Discards buffered entries without emitting them and zeroes the heap statistics.
    ///
    /// Use this between independent measurement runs when the tail of the previous run is of
    /// no interest.
    pub fn reset(&mut self) {
        self.read_index = self.write_index;
        self.stats = MetaStats::default();
    }

    fn record(&mut self, kind: EventKind, address: usize, size: usize) {
        if !self.enabled {
            return;
        }

        *self.slot_mut(self.write_index) = LogEntry::single(kind, address, size);
        self.write_index = self.write_index.wrapping_add(1);

        self.flush(false);
    }

    /// Fuses the two newest entries for as long as they form a causal pair.
    #[cfg_attr(test, mutants::skip)] // Mutated loop conditions never terminate.
    fn fuse_newest(&mut self) {
        while self.pending() >= 2 {
            let newest = *self.slot(self.write_index.wrapping_sub(1));

            if !self
                .slot_mut(self.write_index.wrapping_sub(2))
                .try_fuse(&newest)
            {
                break;
            }

            self.write_index = self.write_index.wrapping_sub(1);
        }
    }

    /// Collapses runs from the oldest end and emits whatever cannot be collapsed.
    #[cfg_attr(test, mutants::skip)] // Mutated loop conditions never terminate.
    fn drain(&mut self, force: bool) {
        while self.pending() > 0 && (force || self.pending() >= RING_CAPACITY) {
            let oldest = *self.slot(self.read_index);

            if self.pending() >= 2
                && oldest.try_merge_into(self.slot_mut(self.read_index.wrapping_add(1)))
            {
                self.read_index = self.read_index.wrapping_add(1);
                continue;
            }

            self.sink.emit(&oldest);
            self.read_index = self.read_index.wrapping_add(1);
        }
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "index is reduced modulo the array length"
    )]
    fn slot(&self, index: usize) -> &LogEntry {
        &self.entries[index % RING_CAPACITY]
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "index is reduced modulo the array length"
    )]
    fn slot_mut(&mut self, index: usize) -> &mut LogEntry {
        &mut self.entries[index % RING_CAPACITY]
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("pending", &self.pending())
            .field("stats", &self.stats)
            .field("enabled", &self.enabled)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.flush(true);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use mockall::predicate::always;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::MockEntrySink;

    // The sink is an arbitrary trait object that may hold thread-bound state.
    assert_not_impl_any!(EventLog: Send, Sync);

    #[derive(Debug, Default, Clone)]
    struct Recorded(Rc<RefCell<Vec<LogEntry>>>);

    impl Recorded {
        fn take(&self) -> Vec<LogEntry> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    impl EntrySink for Recorded {
        fn emit(&mut self, entry: &LogEntry) {
            self.0.borrow_mut().push(*entry);
        }
    }

    fn recording_log() -> (EventLog, Recorded) {
        let recorded = Recorded::default();
        let mut log = EventLog::new(recorded.clone());
        log.set_enabled(true);
        (log, recorded)
    }

    #[test]
    fn malloc_allocate_pair_emits_single_fused_entry() {
        let (mut log, recorded) = recording_log();

        log.malloc(0x100, 8);
        log.allocate(0x100, 8);
        log.flush(true);

        assert_eq!(
            recorded.take(),
            vec![LogEntry::single(EventKind::MallocAllocate, 0x100, 8)]
        );
    }

    #[test]
    fn deallocate_free_pair_emits_single_fused_entry() {
        let (mut log, recorded) = recording_log();

        log.deallocate(0x300, 24);
        log.free(0x300, 24);
        log.flush(true);

        assert_eq!(
            recorded.take(),
            vec![LogEntry::single(EventKind::FreeDeallocate, 0x300, 24)]
        );
    }

    #[test]
    fn identical_sized_run_collapses() {
        let (mut log, recorded) = recording_log();

        for i in 0..5 {
            log.deallocate(0x1000 + i * 0x10, 4);
        }
        log.flush(true);

        let emitted = recorded.take();
        assert_eq!(emitted.len(), 1);

        let entry = emitted.first().unwrap();
        assert_eq!(entry.kind, EventKind::Deallocate);
        assert_eq!(entry.repeat, 5);
        assert_eq!(entry.size, 4);
    }

    #[test]
    fn long_run_stays_bounded_and_collapses() {
        let (mut log, recorded) = recording_log();

        for i in 0..10_000 {
            log.allocate(i * 8, 8);
            assert!(log.pending() < RING_CAPACITY);
        }
        log.flush(true);

        let emitted = recorded.take();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted.first().unwrap().repeat, 10_000);
    }

    #[test]
    fn fused_pairs_collapse_into_runs() {
        let (mut log, recorded) = recording_log();

        for i in 0..6 {
            log.malloc(0x100 + i * 0x40, 32);
            log.allocate(0x100 + i * 0x40, 32);
        }
        log.flush(true);

        let emitted = recorded.take();
        assert_eq!(emitted.len(), 1);

        let entry = emitted.first().unwrap();
        assert_eq!(entry.kind, EventKind::MallocAllocate);
        assert_eq!(entry.repeat, 6);
        assert_eq!(entry.total_bytes(), 192);
    }

    #[test]
    fn different_sizes_are_emitted_in_order() {
        let (mut log, recorded) = recording_log();

        log.allocate(0x10, 4);
        log.allocate(0x20, 8);
        log.allocate(0x30, 8);
        log.allocate(0x40, 4);
        log.flush(true);

        let emitted = recorded.take();
        let shape: Vec<_> = emitted.iter().map(|e| (e.size, e.repeat)).collect();
        assert_eq!(shape, vec![(4, 1), (8, 2), (4, 1)]);
    }

    #[test]
    fn unforced_flush_keeps_partial_buffer() {
        let (mut log, recorded) = recording_log();

        log.allocate(0x10, 4);
        log.deallocate(0x20, 8);
        log.flush(false);

        assert!(recorded.take().is_empty());
        assert_eq!(log.pending(), 2);
    }

    #[test]
    fn full_buffer_drains_oldest_without_force() {
        let (mut log, recorded) = recording_log();

        log.allocate(0x10, 1);
        log.allocate(0x20, 2);
        log.allocate(0x30, 3);
        log.allocate(0x40, 4);

        // The fourth entry filled the buffer, so the oldest had to go.
        let emitted = recorded.take();
        assert_eq!(emitted, vec![LogEntry::single(EventKind::Allocate, 0x10, 1)]);
        assert_eq!(log.pending(), RING_CAPACITY - 1);
    }

    #[test]
    fn fusion_only_considers_adjacent_entries() {
        let (mut log, recorded) = recording_log();

        // The allocate of 0x10 is not adjacent to the malloc of 0x10, so they stay apart.
        log.malloc(0x10, 8);
        log.allocate(0x20, 8);
        log.allocate(0x10, 8);
        log.flush(true);

        let emitted = recorded.take();
        let shape: Vec<_> = emitted.iter().map(|e| (e.kind, e.repeat)).collect();
        assert_eq!(
            shape,
            vec![(EventKind::Malloc, 1), (EventKind::Allocate, 2)]
        );
    }

    #[test]
    fn second_forced_flush_emits_nothing() {
        let mut sink = MockEntrySink::new();
        sink.expect_emit().with(always()).times(1).return_const(());

        let mut log = EventLog::new(sink);
        log.set_enabled(true);

        log.malloc(0x100, 8);
        log.allocate(0x100, 8);
        log.flush(true);
        log.flush(true);
    }

    #[test]
    fn drop_flushes_pending_entries() {
        let recorded = Recorded::default();

        {
            let mut log = EventLog::new(recorded.clone());
            log.set_enabled(true);
            log.allocate(0x10, 4);
            log.deallocate(0x10, 4);
            assert!(recorded.0.borrow().is_empty());
        }

        assert_eq!(recorded.take().len(), 2);
    }

    #[test]
    fn stats_are_kept_while_disabled() {
        let mut sink = MockEntrySink::new();
        sink.expect_emit().never();

        let mut log = EventLog::new(sink);
        assert!(!log.is_enabled());

        log.malloc(0x10, 16);
        log.malloc(0x20, 32);
        log.free(0x10, 16);
        log.flush(true);

        let stats = log.meta_stats();
        assert_eq!(stats.peak_bytes, 48);
        assert_eq!(stats.current_bytes, 32);
        assert_eq!(stats.malloc_count, 2);
        assert_eq!(stats.free_count, 1);
        assert_eq!(log.pending(), 0);
    }

    #[test]
    fn stats_match_when_enabled() {
        let (mut log, _recorded) = recording_log();

        log.malloc(0x10, 16);
        log.malloc(0x20, 32);
        log.free(0x10, 16);

        let stats = log.meta_stats();
        assert_eq!(stats.peak_bytes, 48);
        assert_eq!(stats.current_bytes, 32);
        assert_eq!(stats.malloc_count, 2);
        assert_eq!(stats.free_count, 1);
    }

    #[test]
    fn reset_meta_stats_leaves_buffer_alone() {
        let (mut log, recorded) = recording_log();

        log.malloc(0x10, 16);
        log.reset_meta_stats();

        assert_eq!(log.meta_stats(), MetaStats::default());
        assert_eq!(log.pending(), 1);

        log.flush(true);
        assert_eq!(recorded.take().len(), 1);
    }

    #[test]
    fn reset_discards_pending_entries() {
        let (mut log, recorded) = recording_log();

        log.malloc(0x10, 16);
        log.allocate(0x20, 4);
        log.reset();

        assert_eq!(log.pending(), 0);
        assert_eq!(log.meta_stats(), MetaStats::default());

        log.flush(true);
        assert!(recorded.take().is_empty());
    }

    #[test]
    fn disabling_keeps_buffered_entries_until_flush() {
        let (mut log, recorded) = recording_log();

        log.allocate(0x10, 4);
        log.set_enabled(false);
        log.allocate(0x20, 4);

        assert_eq!(log.pending(), 1);

        log.flush(true);
        assert_eq!(recorded.take().len(), 1);
    }

    #[test]
    fn log_meta_stats_does_not_disturb_state() {
        let (mut log, _recorded) = recording_log();

        log.malloc(0x10, 16);
        log.log_meta_stats();

        assert_eq!(log.meta_stats().malloc_count, 1);
        assert_eq!(log.pending(), 1);
    }
}
