//! Bounded ring buffer of received log records.
//!
//! When the buffer is full, oldest entries are evicted to make room for new
//! ones. Cheap to clone; clones share the same buffer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::LogRecord;

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Clone)]
pub struct LogRing {
    inner: Arc<RingInner>,
}

struct RingInner {
    entries: RwLock<VecDeque<LogRecord>>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RingInner {
                entries: RwLock::new(VecDeque::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append a record, evicting the oldest entry when full.
    pub fn push(&self, record: LogRecord) {
        let mut entries = self.inner.entries.write();
        if entries.len() >= self.inner.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Replace the buffer contents, keeping at most `capacity` newest records.
    pub fn replace(&self, records: Vec<LogRecord>) {
        let mut entries = self.inner.entries.write();
        entries.clear();
        let skip = records.len().saturating_sub(self.inner.capacity);
        entries.extend(records.into_iter().skip(skip));
    }

    /// Current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.inner.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
