//! Install and dev-server lifecycle handlers

use std::sync::Arc;

use tracing::{error, info};

use crate::error::DaemonError;
use crate::hub::LogLevel;
use crate::process;
use crate::protocol::*;
use crate::registry::ProjectStatus;
use crate::state::DaemonState;

/// Package manager used when the caller does not name one.
const DEFAULT_PACKAGE_MANAGER: &str = "npm";

/// How much captured install output rides along in an error message; the
/// full stream has already been delivered to subscribers.
const OUTPUT_TAIL_CHARS: usize = 2000;

pub async fn handle_install(request: &Request, state: Arc<DaemonState>) -> String {
    let params: InstallParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    let Some(project) = state.get_project(&params.project_id).await else {
        return not_found(request.id, &params.project_id);
    };

    let package_manager = params
        .package_manager
        .unwrap_or_else(|| DEFAULT_PACKAGE_MANAGER.to_string());

    state
        .set_project_status(&project.id, ProjectStatus::Installing)
        .await;
    state
        .publish_message(
            &project.id,
            LogLevel::Info,
            format!("Installing dependencies with {package_manager}"),
        )
        .await;

    match process::run_install(state.clone(), &project.id, &project.path, &package_manager).await {
        Ok(output) => {
            state
                .set_project_status(&project.id, ProjectStatus::Ready)
                .await;
            state
                .publish_message(&project.id, LogLevel::Success, "Dependencies installed")
                .await;
            let resp = SuccessResponse::new(
                request.id,
                InstallResult {
                    success: true,
                    output,
                },
            );
            serde_json::to_string(&resp).unwrap()
        }
        Err(e) => {
            error!("Install failed for {}: {e}", project.id);
            state
                .set_project_status(&project.id, ProjectStatus::Error)
                .await;
            state
                .publish_message(&project.id, LogLevel::Error, format!("Install failed: {e}"))
                .await;

            let message = match &e {
                DaemonError::InstallFailed { exit_code, output } => {
                    format!("install exited with code {exit_code}: {}", tail(output))
                }
                other => other.to_string(),
            };
            let resp = ErrorResponse::new(request.id, e.code(), message);
            serde_json::to_string(&resp).unwrap()
        }
    }
}

pub async fn handle_start(request: &Request, state: Arc<DaemonState>) -> String {
    let params: ProjectIdParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    let Some(project) = state.get_project(&params.project_id).await else {
        return not_found(request.id, &params.project_id);
    };

    // Idempotent start: an active server keeps its binding.
    if let Some(handle) = state.get_server(&project.id).await {
        let resp = SuccessResponse::new(request.id, binding(handle.port));
        return serde_json::to_string(&resp).unwrap();
    }

    let port = match state.ports.lock().await.allocate() {
        Ok(port) => port,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
            return serde_json::to_string(&resp).unwrap();
        }
    };

    state
        .set_project_status(&project.id, ProjectStatus::Starting)
        .await;

    let (program, args) = process::dev_server_command(project.framework);
    let handle = match process::spawn_dev_server(
        state.clone(),
        &project.id,
        &project.path,
        program,
        args,
        port,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start dev server for {}: {e}", project.id);
            state.ports.lock().await.release(port);
            state
                .set_project_status(&project.id, ProjectStatus::Error)
                .await;
            state
                .publish_message(
                    &project.id,
                    LogLevel::Error,
                    format!("Failed to start dev server: {e}"),
                )
                .await;
            let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
            return serde_json::to_string(&resp).unwrap();
        }
    };

    // Double-check for a racing start before storing.
    if let Some(existing) = state.get_server(&project.id).await {
        process::terminate(&handle).await;
        state.ports.lock().await.release(port);
        let resp = SuccessResponse::new(request.id, binding(existing.port));
        return serde_json::to_string(&resp).unwrap();
    }
    state.store_server(handle).await;

    // Give the server a moment to bind its listener before handing out the
    // URL. Unrelated projects keep making progress; only this request waits.
    tokio::time::sleep(process::DEV_SERVER_SETTLE).await;

    state
        .set_project_status(&project.id, ProjectStatus::Ready)
        .await;
    let result = binding(port);
    state
        .publish_message(
            &project.id,
            LogLevel::Success,
            format!("Dev server running at {}", result.url),
        )
        .await;
    info!("Dev server for {} at {}", project.id, result.url);

    let resp = SuccessResponse::new(request.id, result);
    serde_json::to_string(&resp).unwrap()
}

pub async fn handle_stop(request: &Request, state: &DaemonState) -> String {
    let params: ProjectIdParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    if state.get_project(&params.project_id).await.is_none() {
        return not_found(request.id, &params.project_id);
    }

    let was_running = state.stop_dev_server(&params.project_id).await;
    if was_running {
        state
            .publish_message(&params.project_id, LogLevel::Info, "Dev server stopped")
            .await;
    }

    let resp = SuccessResponse::new(request.id, serde_json::json!({}));
    serde_json::to_string(&resp).unwrap()
}

fn binding(port: u16) -> StartDevServerResult {
    StartDevServerResult {
        port,
        url: format!("http://localhost:{port}"),
    }
}

fn tail(output: &str) -> &str {
    let len = output.len();
    if len <= OUTPUT_TAIL_CHARS {
        return output;
    }
    let mut start = len - OUTPUT_TAIL_CHARS;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    &output[start..]
}

fn not_found(request_id: u64, project_id: &str) -> String {
    let resp = ErrorResponse::new(
        request_id,
        NOT_FOUND,
        format!("Project not found: {project_id}"),
    );
    serde_json::to_string(&resp).unwrap()
}
