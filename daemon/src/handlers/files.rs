//! File write handler with path containment

use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::DaemonError;
use crate::hub::LogLevel;
use crate::protocol::*;
use crate::state::DaemonState;

pub async fn handle_write_file(request: &Request, state: &DaemonState) -> String {
    let params: WriteFileParams = match serde_json::from_value(request.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            let resp = ErrorResponse::new(request.id, INVALID_PARAMS, format!("Invalid params: {e}"));
            return serde_json::to_string(&resp).unwrap();
        }
    };

    let Some(project) = state.get_project(&params.project_id).await else {
        let resp = ErrorResponse::new(
            request.id,
            NOT_FOUND,
            format!("Project not found: {}", params.project_id),
        );
        return serde_json::to_string(&resp).unwrap();
    };

    match write_project_file(&project.path, &params.path, &params.content) {
        Ok(target) => {
            debug!("Wrote {} bytes to {}", params.content.len(), target.display());
            let resp = SuccessResponse::new(request.id, serde_json::json!({}));
            serde_json::to_string(&resp).unwrap()
        }
        Err(e) => {
            state
                .publish_message(
                    &project.id,
                    LogLevel::Error,
                    format!("Write to {} rejected: {e}", params.path),
                )
                .await;
            let resp = ErrorResponse::new(request.id, e.code(), e.to_string());
            serde_json::to_string(&resp).unwrap()
        }
    }
}

/// Write `content` to `relative` inside the project root. The containment
/// check happens before any filesystem mutation.
pub fn write_project_file(
    root: &Path,
    relative: &str,
    content: &str,
) -> Result<PathBuf, DaemonError> {
    let target = contained_path(root, relative)?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, content)?;
    Ok(target)
}

/// Resolve a caller-supplied relative path against the project root,
/// rejecting anything that would land outside it. Purely lexical: the
/// target may not exist yet.
pub fn contained_path(root: &Path, relative: &str) -> Result<PathBuf, DaemonError> {
    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(DaemonError::PathEscape(relative.to_string()));
    }

    let mut normalized = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DaemonError::PathEscape(relative.to_string()));
                }
            }
            _ => return Err(DaemonError::PathEscape(relative.to_string())),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(DaemonError::PathEscape(relative.to_string()));
    }
    Ok(root.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_relative_paths() {
        let root = Path::new("/work/todo-1a2b3c4d");
        assert_eq!(
            contained_path(root, "src/App.jsx").unwrap(),
            root.join("src/App.jsx")
        );
        assert_eq!(contained_path(root, "./README.md").unwrap(), root.join("README.md"));
        assert_eq!(contained_path(root, "a/../b.txt").unwrap(), root.join("b.txt"));
    }

    #[test]
    fn rejects_escaping_paths() {
        let root = Path::new("/work/todo-1a2b3c4d");
        assert!(matches!(
            contained_path(root, "../outside.txt"),
            Err(DaemonError::PathEscape(_))
        ));
        assert!(matches!(
            contained_path(root, "src/../../outside.txt"),
            Err(DaemonError::PathEscape(_))
        ));
        assert!(matches!(
            contained_path(root, "/etc/passwd"),
            Err(DaemonError::PathEscape(_))
        ));
        assert!(matches!(
            contained_path(root, ""),
            Err(DaemonError::PathEscape(_))
        ));
    }

    #[test]
    fn escape_attempt_leaves_filesystem_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir_all(&root).unwrap();

        let result = write_project_file(&root, "../escaped.txt", "nope");
        assert!(matches!(result, Err(DaemonError::PathEscape(_))));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_project_file(dir.path(), "src/components/Button.jsx", "export {}").unwrap();
        assert!(dir.path().join("src/components/Button.jsx").exists());
    }
}
