//! Client for the Atelier daemon.
//!
//! [`Consumer`] maintains a persistent connection with exponential-backoff
//! reconnection, streams the active project's log records into a bounded
//! ring buffer (optionally mirrored to disk), and polls project status
//! until it settles.

pub mod client;
pub mod consumer;
pub mod protocol;
pub mod ring;
pub mod store;

pub use client::{ClientError, Connection, ServerEvent};
pub use consumer::{backoff_delay, Consumer, ConsumerConfig, ConsumerEvent};
pub use protocol::{LogLevel, LogRecord, ProjectStatus, ProjectStatusView};
pub use ring::LogRing;
pub use store::LogStore;
