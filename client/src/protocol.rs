//! Client-side mirror of the daemon wire protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request to the daemon
#[derive(Debug, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

// Method names
pub const METHOD_SUBSCRIBE: &str = "subscribe";
pub const METHOD_GET_STATUS: &str = "get_status";

// Event names
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_SUBSCRIBED: &str = "subscribed";
pub const EVENT_LOG: &str = "log";

// Error codes the consumer reacts to
pub const NOT_FOUND: &str = "not_found";

/// Severity of one log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// One classified line of process output, as streamed by the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub project_id: String,
}

/// Project lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Creating,
    Installing,
    Starting,
    Ready,
    Error,
}

impl ProjectStatus {
    /// Terminal statuses stop the consumer's polling loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Ready | ProjectStatus::Error)
    }
}

/// Status view returned by `get_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatusView {
    pub id: String,
    pub name: String,
    pub framework: String,
    pub status: ProjectStatus,
    pub running: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub url: Option<String>,
    pub monitoring_configured: bool,
}
