//! End-to-end lifecycle tests driving the handler layer directly.
//!
//! The dev-server path spawns real `npm` processes and is exercised by the
//! process-level tests instead; everything else here runs against throwaway
//! commands and a tempdir workspace.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use atelier_daemon::handlers;
use atelier_daemon::protocol::Request;
use atelier_daemon::registry::ProjectRegistry;
use atelier_daemon::state::DaemonState;

fn test_state() -> (Arc<DaemonState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(DaemonState::new(
        dir.path().to_path_buf(),
        3101,
        3110,
        ProjectRegistry::new(),
    ));
    (state, dir)
}

async fn call(state: &Arc<DaemonState>, method: &str, params: Value) -> Value {
    let request = Request {
        id: 1,
        method: method.to_string(),
        params,
    };
    let response = handlers::dispatch(&request, state.clone(), 1).await;
    serde_json::from_str(&response).unwrap()
}

fn result(response: &Value) -> &Value {
    response
        .get("result")
        .unwrap_or_else(|| panic!("expected result, got {response}"))
}

fn error_code(response: &Value) -> &str {
    response
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("expected error, got {response}"))
}

#[tokio::test]
async fn create_project_scaffolds_directory_with_substituted_name() {
    let (state, dir) = test_state();

    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let project = result(&response);
    let id = project["id"].as_str().unwrap();
    assert_eq!(id.len(), 8);

    let project_dir = dir.path().join(format!("todo-{id}"));
    assert!(project_dir.is_dir());

    let index = std::fs::read_to_string(project_dir.join("index.html")).unwrap();
    assert!(index.contains("<title>todo</title>"));
    assert!(project_dir.join("package.json").exists());

    let status = call(&state, "get_status", json!({"project_id": id})).await;
    let status = result(&status);
    assert_eq!(status["status"], "creating");
    assert_eq!(status["running"], false);
    assert_eq!(status["monitoring_configured"], false);

    let list = call(&state, "list_projects", json!(null)).await;
    assert_eq!(result(&list).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_framework_is_template_missing() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "app", "framework": "angular"}),
    )
    .await;
    assert_eq!(error_code(&response), "template_missing");
}

#[tokio::test]
async fn write_file_rejects_escaping_paths_and_leaves_fs_untouched() {
    let (state, dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    let ok = call(
        &state,
        "write_file",
        json!({"project_id": id, "path": "src/notes.txt", "content": "hi"}),
    )
    .await;
    assert!(ok.get("result").is_some());
    let written = dir.path().join(format!("todo-{id}/src/notes.txt"));
    assert_eq!(std::fs::read_to_string(written).unwrap(), "hi");

    let escape = call(
        &state,
        "write_file",
        json!({"project_id": id, "path": "../escaped.txt", "content": "nope"}),
    )
    .await;
    assert_eq!(error_code(&escape), "path_escape");
    assert!(!dir.path().join("escaped.txt").exists());
}

#[tokio::test]
async fn install_with_succeeding_command_reports_success_and_ready_status() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    // "true install" exits 0 without touching the network.
    let install = call(
        &state,
        "install_dependencies",
        json!({"project_id": id, "package_manager": "true"}),
    )
    .await;
    assert_eq!(result(&install)["success"], true);

    let status = call(&state, "get_status", json!({"project_id": id})).await;
    assert_eq!(result(&status)["status"], "ready");
}

#[tokio::test]
async fn failing_install_surfaces_exit_code_and_error_status() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "vue"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    let install = call(
        &state,
        "install_dependencies",
        json!({"project_id": id, "package_manager": "false"}),
    )
    .await;
    assert_eq!(error_code(&install), "install_failed");

    let status = call(&state, "get_status", json!({"project_id": id})).await;
    assert_eq!(result(&status)["status"], "error");
}

#[tokio::test]
async fn operations_on_unknown_projects_are_not_found() {
    let (state, _dir) = test_state();
    for (method, params) in [
        ("get_status", json!({"project_id": "deadbeef"})),
        ("install_dependencies", json!({"project_id": "deadbeef"})),
        ("start_dev_server", json!({"project_id": "deadbeef"})),
        ("stop_dev_server", json!({"project_id": "deadbeef"})),
        ("delete_project", json!({"project_id": "deadbeef"})),
        ("subscribe", json!({"project_id": "deadbeef"})),
        (
            "write_file",
            json!({"project_id": "deadbeef", "path": "a.txt", "content": ""}),
        ),
        (
            "configure_monitoring",
            json!({"project_id": "deadbeef", "credential": "dsn"}),
        ),
    ] {
        let response = call(&state, method, params).await;
        assert_eq!(error_code(&response), "not_found", "method {method}");
    }
}

#[tokio::test]
async fn stop_without_running_server_is_a_repeatable_noop() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    let first = call(&state, "stop_dev_server", json!({"project_id": id})).await;
    assert!(first.get("result").is_some());
    let second = call(&state, "stop_dev_server", json!({"project_id": id})).await;
    assert!(second.get("result").is_some());
}

#[tokio::test]
async fn delete_project_removes_directory_and_registry_entry() {
    let (state, dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();
    let project_dir = dir.path().join(format!("todo-{id}"));
    assert!(project_dir.exists());

    let deleted = call(&state, "delete_project", json!({"project_id": id})).await;
    assert!(deleted.get("result").is_some());
    assert!(!project_dir.exists());

    let status = call(&state, "get_status", json!({"project_id": id})).await;
    assert_eq!(error_code(&status), "not_found");
}

#[tokio::test]
async fn delete_all_projects_clears_the_workspace() {
    let (state, _dir) = test_state();
    for name in ["one", "two"] {
        call(
            &state,
            "create_project",
            json!({"name": name, "framework": "react"}),
        )
        .await;
    }

    let list = call(&state, "list_projects", json!(null)).await;
    assert_eq!(result(&list).as_array().unwrap().len(), 2);

    call(&state, "delete_all_projects", json!(null)).await;

    let list = call(&state, "list_projects", json!(null)).await;
    assert!(result(&list).as_array().unwrap().is_empty());
}

#[tokio::test]
async fn configure_monitoring_flips_status_flag() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    let configured = call(
        &state,
        "configure_monitoring",
        json!({"project_id": id, "credential": "dsn-123"}),
    )
    .await;
    assert!(configured.get("result").is_some());

    let status = call(&state, "get_status", json!({"project_id": id})).await;
    assert_eq!(result(&status)["monitoring_configured"], true);
}

#[tokio::test]
async fn subscribe_acknowledges_known_projects() {
    let (state, _dir) = test_state();
    let response = call(
        &state,
        "create_project",
        json!({"name": "todo", "framework": "react"}),
    )
    .await;
    let id = result(&response)["id"].as_str().unwrap().to_string();

    let subscribed = call(&state, "subscribe", json!({"project_id": id})).await;
    assert_eq!(result(&subscribed)["project_id"], id.as_str());
}

#[tokio::test]
async fn unknown_method_is_invalid_params() {
    let (state, _dir) = test_state();
    let response = call(&state, "no_such_method", json!(null)).await;
    assert_eq!(error_code(&response), "invalid_params");
}
