//! Persisted mirror of the log ring.
//!
//! The mirror is advisory: a write failure (full disk, quota) must never
//! take down the consumer. On failure the oldest persisted batch is dropped
//! and the write retried once; a second failure is reported and otherwise
//! ignored by callers.

use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::protocol::LogRecord;

pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted mirror; an absent or corrupt file yields nothing.
    pub fn load(&self) -> Vec<LogRecord> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(e) => {
                debug!("Discarding corrupt log mirror {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    /// Persist the ring contents, dropping the oldest batch and retrying
    /// once when the write fails.
    pub fn save(&self, records: &[LogRecord]) -> io::Result<()> {
        match self.write(records) {
            Ok(()) => Ok(()),
            Err(first) => {
                let trimmed = drop_oldest_batch(records);
                warn!(
                    "Log mirror write failed ({first}), retrying with {} of {} records",
                    trimmed.len(),
                    records.len()
                );
                self.write(trimmed)
            }
        }
    }

    fn write(&self, records: &[LogRecord]) -> io::Result<()> {
        let json = serde_json::to_string(records)?;
        std::fs::write(&self.path, json)
    }
}

/// Drop the oldest half of the records; the newest are the ones worth
/// keeping when space runs out.
pub fn drop_oldest_batch(records: &[LogRecord]) -> &[LogRecord] {
    &records[records.len() / 2..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LogLevel;
    use chrono::Utc;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.to_string(),
            project_id: "p1".to_string(),
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("logs.json"));

        store.save(&[record("a"), record("b")]).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].message, "a");
    }

    #[test]
    fn load_of_missing_or_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());

        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = LogStore::new(dir.path().join("bad.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn drop_oldest_batch_keeps_newest_half() {
        let records: Vec<LogRecord> = (0..4).map(|i| record(&i.to_string())).collect();
        let kept = drop_oldest_batch(&records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].message, "2");
        assert_eq!(kept[1].message, "3");
    }

    #[test]
    fn drop_oldest_batch_handles_tiny_inputs() {
        let one = [record("only")];
        assert_eq!(drop_oldest_batch(&one).len(), 1);
        let none: [LogRecord; 0] = [];
        assert!(drop_oldest_batch(&none).is_empty());
    }

    #[test]
    fn save_retries_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("gone").join("logs.json"));
        // Both the write and the retry fail; the error is surfaced, not
        // panicked on.
        assert!(store.save(&[record("a")]).is_err());
    }
}
