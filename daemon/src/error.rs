use thiserror::Error;

use crate::protocol;

/// Errors surfaced by daemon operations.
///
/// Every filesystem and process failure is caught at the operation boundary
/// and converted into one of these variants; a single project's failure never
/// touches another project's processes.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("path escapes project root: {0}")]
    PathEscape(String),

    #[error("no free ports left in the managed range")]
    PortExhausted,

    #[error("no template for framework: {0}")]
    TemplateMissing(String),

    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("install exited with code {exit_code}")]
    InstallFailed { exit_code: i32, output: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DaemonError {
    /// Protocol error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            DaemonError::NotFound(_) => protocol::NOT_FOUND,
            DaemonError::PathEscape(_) => protocol::PATH_ESCAPE,
            DaemonError::PortExhausted => protocol::PORT_EXHAUSTED,
            DaemonError::TemplateMissing(_) => protocol::TEMPLATE_MISSING,
            DaemonError::SpawnFailed { .. } => protocol::SPAWN_FAILED,
            DaemonError::InstallFailed { .. } => protocol::INSTALL_FAILED,
            DaemonError::Io(_) | DaemonError::Json(_) => protocol::INTERNAL_ERROR,
        }
    }
}
