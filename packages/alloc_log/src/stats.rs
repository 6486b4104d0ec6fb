use std::fmt;

/// Aggregate heap statistics accumulated from `malloc` and `free` events.
///
/// These are updated on every heap event, whether or not detailed logging is enabled, and are
/// only ever zeroed by an explicit [`EventLog::reset_meta_stats()`][crate::EventLog::reset_meta_stats].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct MetaStats {
    /// Number of `malloc` events recorded.
    pub malloc_count: usize,

    /// Number of `free` events recorded.
    pub free_count: usize,

    /// Bytes obtained from the heap and not yet returned.
    pub current_bytes: usize,

    /// Highest value `current_bytes` has reached.
    pub peak_bytes: usize,
}

impl MetaStats {
    pub(crate) fn record_malloc(&mut self, size: usize) {
        self.malloc_count = self.malloc_count.saturating_add(1);
        self.current_bytes = self.current_bytes.saturating_add(size);
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    pub(crate) fn record_free(&mut self, size: usize) {
        self.free_count = self.free_count.saturating_add(1);

        // Saturates when a caller frees more than it obtained.
        self.current_bytes = self.current_bytes.saturating_sub(size);
    }
}

impl fmt::Display for MetaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malloc {:>6}x free {:>6}x | now {:>6} peak {:>6}",
            self.malloc_count, self.free_count, self.current_bytes, self.peak_bytes
        )
    }
}
