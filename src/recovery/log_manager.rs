use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::{Lsn, INVALID_LSN};

/// LogManager hands out log sequence numbers for the write-ahead log.
///
/// The buffer pool accepts one at construction so dirty-page write-back can
/// later be ordered against the log, but nothing is appended yet.
#[derive(Debug)]
pub struct LogManager {
    /// Next LSN to hand out
    next_lsn: AtomicU64,
    /// Highest LSN known to be durable
    persistent_lsn: AtomicU64,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(INVALID_LSN + 1),
            persistent_lsn: AtomicU64::new(INVALID_LSN),
        }
    }

    /// Returns the LSN the next log record will receive.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::Acquire)
    }

    /// Returns the highest LSN flushed to stable storage.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::Acquire)
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
