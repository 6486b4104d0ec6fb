use std::cell::RefCell;
use std::rc::Rc;

use crate::{EventLog, MetaStats};

/// Shared handle to an [`EventLog`], held by every allocator that reports traffic into it.
///
/// Cloning the handle is cheap and every clone refers to the same log. A detached handle (see
/// [`Logger::detached()`], also the [`Default`]) silently ignores everything, which lets
/// allocators be used without any tracing at all.
///
/// The handle is single-threaded. An [`EntrySink`][crate::EntrySink] that records into an
/// allocator reporting into this same logger would re-enter the log and panic.
///
/// # Examples
///
/// ```
/// use alloc_log::{EventLog, Logger};
///
/// let logger = Logger::new(EventLog::with_tracing());
/// let for_allocator = logger.clone();
///
/// for_allocator.malloc(0x2000, 128);
/// for_allocator.free(0x2000, 128);
///
/// let stats = logger.meta_stats();
/// assert_eq!(stats.peak_bytes, 128);
/// assert_eq!(stats.current_bytes, 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Logger {
    log: Option<Rc<RefCell<EventLog>>>,
}

impl Logger {
    /// Creates a handle that owns `log`.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log: Some(Rc::new(RefCell::new(log))),
        }
    }

    /// Creates a handle that records nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self { log: None }
    }

    /// Whether this handle is connected to an event log.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.log.is_some()
    }

    /// See [`EventLog::malloc()`].
    pub fn malloc(&self, address: usize, size: usize) {
        self.with_log(|log| log.malloc(address, size));
    }

    /// See [`EventLog::free()`].
    pub fn free(&self, address: usize, size: usize) {
        self.with_log(|log| log.free(address, size));
    }

    /// See [`EventLog::allocate()`].
    pub fn allocate(&self, address: usize, size: usize) {
        self.with_log(|log| log.allocate(address, size));
    }

    /// See [`EventLog::deallocate()`].
    pub fn deallocate(&self, address: usize, size: usize) {
        self.with_log(|log| log.deallocate(address, size));
    }

    /// See [`EventLog::flush()`].
    pub fn flush(&self, force: bool) {
        self.with_log(|log| log.flush(force));
    }

    /// See [`EventLog::set_enabled()`].
    pub fn set_enabled(&self, enabled: bool) {
        self.with_log(|log| log.set_enabled(enabled));
    }

    /// See [`EventLog::is_enabled()`]. A detached handle is never enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.log
            .as_ref()
            .is_some_and(|log| log.borrow().is_enabled())
    }

    /// See [`EventLog::meta_stats()`]. A detached handle reports all zeroes.
    #[must_use]
    pub fn meta_stats(&self) -> MetaStats {
        self.log
            .as_ref()
            .map_or_else(MetaStats::default, |log| log.borrow().meta_stats())
    }

    /// See [`EventLog::reset_meta_stats()`].
    pub fn reset_meta_stats(&self) {
        self.with_log(EventLog::reset_meta_stats);
    }

    /// See [`EventLog::log_meta_stats()`].
    pub fn log_meta_stats(&self) {
        self.with_log(|log| log.log_meta_stats());
    }

    /// See [`EventLog::reset()`].
    pub fn reset(&self) {
        self.with_log(EventLog::reset);
    }

    /// See [`EventLog::pending()`].
    #[must_use]
    pub fn pending(&self) -> usize {
        self.log.as_ref().map_or(0, |log| log.borrow().pending())
    }

    fn with_log(&self, f: impl FnOnce(&mut EventLog)) {
        if let Some(log) = &self.log {
            f(&mut *log.borrow_mut());
        }
    }
}

impl PartialEq for Logger {
    /// Two handles are equal when they refer to the same log, or are both detached.
    fn eq(&self, other: &Self) -> bool {
        match (&self.log, &other.log) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for Logger {}
