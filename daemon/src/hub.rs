//! Log record fan-out
//!
//! Per-project publish/subscribe registry. Each subscriber holds a bounded
//! queue; a listener may hold at most one active subscription, and
//! re-subscribing replaces the previous binding.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Queue depth per subscriber. Log delivery is advisory; records published
/// while a subscriber's queue is full are dropped for that subscriber only.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Severity attached to one classified line of process output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// One classified line of process output. Immutable once created and never
/// persisted beyond a bounded buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub project_id: String,
}

impl LogRecord {
    pub fn new(project_id: &str, level: LogLevel, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message,
            project_id: project_id.to_string(),
        }
    }
}

/// Identifies a subscriber (the daemon uses connection client ids).
pub type SubscriberId = u64;

/// Per-project log fan-out registry.
pub struct LogHub {
    subscribers: HashMap<SubscriberId, (String, mpsc::Sender<LogRecord>)>,
}

impl LogHub {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    /// Bind a subscriber to a project's log stream, returning the receiving
    /// end of its queue. Any previous binding for the subscriber is dropped.
    pub fn subscribe(
        &mut self,
        project_id: &str,
        subscriber: SubscriberId,
    ) -> mpsc::Receiver<LogRecord> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers
            .insert(subscriber, (project_id.to_string(), tx));
        rx
    }

    /// Drop a subscriber's binding. Safe to call when never subscribed.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId) {
        self.subscribers.remove(&subscriber);
    }

    /// Deliver a record to every subscriber bound to its project at this
    /// moment. Subscribers added later never receive it.
    pub fn publish(&self, record: &LogRecord) {
        for (subscriber, (project_id, tx)) in &self.subscribers {
            if project_id == &record.project_id {
                if tx.try_send(record.clone()).is_err() {
                    debug!("dropping log record for slow subscriber {subscriber}");
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project_id: &str, message: &str) -> LogRecord {
        LogRecord::new(project_id, LogLevel::Info, message.to_string())
    }

    #[tokio::test]
    async fn delivers_to_subscriber_exactly_once() {
        let mut hub = LogHub::new();
        let mut rx = hub.subscribe("p1", 1);

        hub.publish(&record("p1", "hello"));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.message, "hello");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn does_not_cross_projects() {
        let mut hub = LogHub::new();
        let mut rx_a = hub.subscribe("a", 1);
        let mut rx_b = hub.subscribe("b", 2);

        hub.publish(&record("a", "for a"));

        assert_eq!(rx_a.recv().await.unwrap().message, "for a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_delivery_after_unsubscribe() {
        let mut hub = LogHub::new();
        let mut rx = hub.subscribe("p1", 1);
        hub.unsubscribe(1);

        hub.publish(&record("p1", "late"));

        // Sender was dropped; the channel is closed with nothing buffered.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_binding() {
        let mut hub = LogHub::new();
        let mut rx_old = hub.subscribe("a", 1);
        let mut rx_new = hub.subscribe("b", 1);
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(&record("a", "old project"));
        hub.publish(&record("b", "new project"));

        assert!(rx_old.recv().await.is_none());
        assert_eq!(rx_new.recv().await.unwrap().message, "new project");
    }

    #[test]
    fn unsubscribe_when_never_subscribed_is_safe() {
        let mut hub = LogHub::new();
        hub.unsubscribe(42);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let mut hub = LogHub::new();
        let mut rx = hub.subscribe("p1", 1);

        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            hub.publish(&record("p1", &format!("line {i}")));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_QUEUE_CAPACITY);
    }
}
