//! Test helpers shared by the unit tests of this crate.

use std::cell::RefCell;
use std::rc::Rc;

use alloc_log::{EntrySink, EventLog, LogEntry, Logger};

/// Keeps every emitted entry for later inspection.
#[derive(Debug)]
pub(crate) struct RecordingSink(Rc<RefCell<Vec<LogEntry>>>);

impl EntrySink for RecordingSink {
    fn emit(&mut self, entry: &LogEntry) {
        self.0.borrow_mut().push(*entry);
    }
}

/// A logger with detailed logging enabled, plus the list its entries are emitted into.
pub(crate) fn recording_logger() -> (Logger, Rc<RefCell<Vec<LogEntry>>>) {
    let entries = Rc::new(RefCell::new(Vec::new()));

    let logger = Logger::new(EventLog::new(RecordingSink(Rc::clone(&entries))));
    logger.set_enabled(true);

    (logger, entries)
}
