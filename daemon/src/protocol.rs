use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::LogRecord;
use crate::registry::{Framework, Project, ProjectStatus};

/// JSON-RPC request from client
#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub id: u64,
    pub result: Value,
}

/// JSON-RPC error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub id: u64,
    pub error: RpcError,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: &'static str,
    pub message: String,
}

/// Server→Client event (no id)
#[derive(Debug, Serialize)]
pub struct Event {
    pub method: &'static str,
    pub params: Value,
}

// Error codes
pub const INVALID_PARAMS: &str = "invalid_params";
pub const NOT_FOUND: &str = "not_found";
pub const PATH_ESCAPE: &str = "path_escape";
pub const PORT_EXHAUSTED: &str = "port_exhausted";
pub const TEMPLATE_MISSING: &str = "template_missing";
pub const SPAWN_FAILED: &str = "spawn_failed";
pub const INSTALL_FAILED: &str = "install_failed";
pub const INTERNAL_ERROR: &str = "internal_error";

// Method names
pub const METHOD_CREATE_PROJECT: &str = "create_project";
pub const METHOD_WRITE_FILE: &str = "write_file";
pub const METHOD_INSTALL_DEPENDENCIES: &str = "install_dependencies";
pub const METHOD_START_DEV_SERVER: &str = "start_dev_server";
pub const METHOD_STOP_DEV_SERVER: &str = "stop_dev_server";
pub const METHOD_GET_STATUS: &str = "get_status";
pub const METHOD_LIST_PROJECTS: &str = "list_projects";
pub const METHOD_CONFIGURE_MONITORING: &str = "configure_monitoring";
pub const METHOD_DELETE_PROJECT: &str = "delete_project";
pub const METHOD_DELETE_ALL_PROJECTS: &str = "delete_all_projects";
pub const METHOD_SUBSCRIBE: &str = "subscribe";

// Event names
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_SUBSCRIBED: &str = "subscribed";
pub const EVENT_LOG: &str = "log";

// --- Request params ---

#[derive(Debug, Deserialize)]
pub struct CreateProjectParams {
    pub name: String,
    pub framework: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectIdParams {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileParams {
    pub project_id: String,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallParams {
    pub project_id: String,
    #[serde(default)]
    pub package_manager: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigureMonitoringParams {
    pub project_id: String,
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    pub project_id: String,
}

// --- Response types ---

#[derive(Debug, Serialize)]
pub struct CreateProjectResult {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub path: String,
}

impl CreateProjectResult {
    pub fn from_project(project: &Project) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            framework: project.framework,
            description: project.description.clone(),
            path: project.path.display().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct StartDevServerResult {
    pub port: u16,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectStatusResult {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    pub status: ProjectStatus,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub monitoring_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResult {
    pub project_id: String,
}

// --- Event params ---

#[derive(Debug, Serialize)]
pub struct SubscribedParams {
    pub project_id: String,
}

#[derive(Debug, Serialize)]
pub struct LogEventParams {
    pub record: LogRecord,
}

// --- Helpers ---

impl SuccessResponse {
    pub fn new<T: Serialize>(id: u64, result: T) -> Self {
        Self {
            id,
            result: serde_json::to_value(result).unwrap_or(Value::Null),
        }
    }
}

impl ErrorResponse {
    pub fn new(id: u64, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            id,
            error: RpcError {
                code,
                message: message.into(),
            },
        }
    }
}

impl Event {
    pub fn new<T: Serialize>(method: &'static str, params: T) -> Self {
        Self {
            method,
            params: serde_json::to_value(params).unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_params_to_null() {
        let request: Request =
            serde_json::from_str(r#"{"id":1,"method":"list_projects"}"#).expect("request to parse");
        assert_eq!(request.id, 1);
        assert_eq!(request.method, "list_projects");
        assert_eq!(request.params, json!(null));
    }

    #[test]
    fn success_response_serializes_result() {
        let response = SuccessResponse::new(2, json!({"ok": true}));
        let value = serde_json::to_value(response).expect("response to serialize");
        assert_eq!(value.get("id"), Some(&json!(2)));
        assert_eq!(value.get("result"), Some(&json!({"ok": true})));
    }

    #[test]
    fn error_response_serializes_error() {
        let response = ErrorResponse::new(3, NOT_FOUND, "unknown project");
        let value = serde_json::to_value(response).expect("error to serialize");
        assert_eq!(value.get("id"), Some(&json!(3)));
        let error = value.get("error").expect("error field");
        assert_eq!(error.get("code"), Some(&json!(NOT_FOUND)));
        assert_eq!(error.get("message"), Some(&json!("unknown project")));
    }

    #[test]
    fn event_serializes_params() {
        let event = Event::new(EVENT_SUBSCRIBED, json!({"project_id": "ab12cd34"}));
        let value = serde_json::to_value(event).expect("event to serialize");
        assert_eq!(value.get("method"), Some(&json!(EVENT_SUBSCRIBED)));
        assert_eq!(
            value.get("params"),
            Some(&json!({"project_id": "ab12cd34"}))
        );
    }

    #[test]
    fn install_params_default_package_manager() {
        let params: InstallParams =
            serde_json::from_value(json!({"project_id": "ab12cd34"})).expect("params to parse");
        assert!(params.package_manager.is_none());
    }
}
