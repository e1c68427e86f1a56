//! Project CRUD and status handlers

use std::path::Path;

use chrono::Utc;
use tracing::{error, info};

use crate::error::DaemonError;
use crate::hub::LogLevel;
use crate::protocol::*;
use crate::registry::{self, Framework, Project, ProjectStatus};
use crate::state::DaemonState;
use crate::template;

/// Key written into the project's env file by configure_monitoring.
const MONITORING_KEY: &str = "MONITORING_DSN";

/// Env file owned by the scaffolded app, not by the daemon.
const ENV_FILE: &str = ".env.local";

pub async fn handle_create(request: &Request, state: &DaemonState) -> String {
    let params: CreateProjectParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    let Some(framework) = Framework::from_name(&params.framework) else {
        let resp = ErrorResponse::new(
            request.id,
            TEMPLATE_MISSING,
            format!("No template for framework: {}", params.framework),
        );
        return serde_json::to_string(&resp).unwrap();
    };

    let id = registry::generate_id();
    let dir_name = format!("{}-{}", registry::sanitize_name(&params.name), id);
    let path = state.workspace_root.join(&dir_name);

    if let Err(e) = template::materialize(framework, &path, &params.name) {
        error!("Failed to materialize template for {id}: {e}");
        let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
        return serde_json::to_string(&resp).unwrap();
    }

    let project = Project {
        id: id.clone(),
        name: params.name,
        framework,
        description: params.description,
        path,
        created_at: Utc::now(),
        status: ProjectStatus::Creating,
    };
    state.registry.write().await.insert(project.clone());

    info!("Created project {id} ({}) at {}", project.name, project.path.display());
    let resp = SuccessResponse::new(request.id, CreateProjectResult::from_project(&project));
    serde_json::to_string(&resp).unwrap()
}

pub async fn handle_status(request: &Request, state: &DaemonState) -> String {
    let params: ProjectIdParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    match state.get_project(&params.project_id).await {
        Some(project) => {
            let result = status_result(state, &project).await;
            let resp = SuccessResponse::new(request.id, result);
            serde_json::to_string(&resp).unwrap()
        }
        None => not_found(request.id, &params.project_id),
    }
}

pub async fn handle_list(request: &Request, state: &DaemonState) -> String {
    let projects = state.registry.read().await.list();
    let mut results = Vec::with_capacity(projects.len());
    for project in &projects {
        results.push(status_result(state, project).await);
    }
    let resp = SuccessResponse::new(request.id, results);
    serde_json::to_string(&resp).unwrap()
}

pub async fn handle_configure_monitoring(request: &Request, state: &DaemonState) -> String {
    let params: ConfigureMonitoringParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    let Some(project) = state.get_project(&params.project_id).await else {
        return not_found(request.id, &params.project_id);
    };

    match write_monitoring_credential(&project.path, &params.credential) {
        Ok(()) => {
            info!("Configured monitoring for {}", project.id);
            let resp = SuccessResponse::new(request.id, serde_json::json!({}));
            serde_json::to_string(&resp).unwrap()
        }
        Err(e) => {
            state
                .publish_message(
                    &project.id,
                    LogLevel::Error,
                    format!("Monitoring configuration failed: {e}"),
                )
                .await;
            let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
            serde_json::to_string(&resp).unwrap()
        }
    }
}

pub async fn handle_delete(request: &Request, state: &DaemonState) -> String {
    let params: ProjectIdParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    match delete_project(state, &params.project_id).await {
        Ok(()) => {
            let resp = SuccessResponse::new(request.id, serde_json::json!({}));
            serde_json::to_string(&resp).unwrap()
        }
        Err(e) => {
            let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
            serde_json::to_string(&resp).unwrap()
        }
    }
}

pub async fn handle_delete_all(request: &Request, state: &DaemonState) -> String {
    let ids = state.registry.read().await.ids();
    for id in ids {
        if let Err(e) = delete_project(state, &id).await {
            error!("Failed to delete project {id}: {e}");
        }
    }
    let resp = SuccessResponse::new(request.id, serde_json::json!({}));
    serde_json::to_string(&resp).unwrap()
}

/// Stop the project's dev server, drop it from the registry and remove its
/// directory.
async fn delete_project(state: &DaemonState, project_id: &str) -> Result<(), DaemonError> {
    let project = state
        .get_project(project_id)
        .await
        .ok_or_else(|| DaemonError::NotFound(project_id.to_string()))?;

    state.stop_dev_server(project_id).await;
    state.registry.write().await.remove(project_id);

    // Only ever remove directories inside the workspace root.
    if project.path.starts_with(&state.workspace_root) && project.path.exists() {
        std::fs::remove_dir_all(&project.path)?;
    }

    info!("Deleted project {project_id}");
    Ok(())
}

/// Resolve the externally visible status view for a project.
///
/// A running dev server reports `ready` regardless of the recorded status;
/// recorded transitions only exist for this daemon run, so recovered
/// projects collapse to ready-if-running-else-creating.
pub async fn status_result(state: &DaemonState, project: &Project) -> ProjectStatusResult {
    let server = state.get_server(&project.id).await;
    let running = server.is_some();
    let port = server.as_ref().map(|handle| handle.port);
    let url = port.map(|port| format!("http://localhost:{port}"));
    let status = if running {
        ProjectStatus::Ready
    } else {
        project.status
    };

    ProjectStatusResult {
        id: project.id.clone(),
        name: project.name.clone(),
        framework: project.framework,
        status,
        running,
        port,
        url,
        monitoring_configured: monitoring_configured(&project.path),
    }
}

fn monitoring_configured(project_path: &Path) -> bool {
    std::fs::read_to_string(project_path.join(ENV_FILE))
        .map(|contents| {
            contents
                .lines()
                .any(|line| line.starts_with(&format!("{MONITORING_KEY}=")))
        })
        .unwrap_or(false)
}

/// Write or replace the monitoring credential in the project's env file,
/// keeping unrelated lines intact.
fn write_monitoring_credential(project_path: &Path, credential: &str) -> Result<(), DaemonError> {
    let env_path = project_path.join(ENV_FILE);
    let existing = std::fs::read_to_string(&env_path).unwrap_or_default();

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.starts_with(&format!("{MONITORING_KEY}=")))
        .map(str::to_string)
        .collect();
    lines.push(format!("{MONITORING_KEY}={credential}"));

    std::fs::write(&env_path, lines.join("\n") + "\n")?;
    Ok(())
}

fn not_found(request_id: u64, project_id: &str) -> String {
    let resp = ErrorResponse::new(
        request_id,
        NOT_FOUND,
        format!("Project not found: {project_id}"),
    );
    serde_json::to_string(&resp).unwrap()
}
