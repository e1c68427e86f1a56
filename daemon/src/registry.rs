//! Project registry
//!
//! In-memory catalog of known projects, rebuilt at startup by scanning the
//! workspace root for directories containing a `package.json` manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Project lifecycle status. `ready` and `error` are terminal for status
/// polling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Creating,
    Installing,
    Starting,
    Ready,
    Error,
}

/// Supported scaffolding frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    React,
    Vue,
}

/// Manifest dependency → framework, first match wins. `next` ships a React
/// app, so it maps to the react tag.
const DETECTION_PRIORITY: &[(&str, Framework)] =
    &[("next", Framework::React), ("react", Framework::React), ("vue", Framework::Vue)];

impl Framework {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "react" => Some(Framework::React),
            "vue" => Some(Framework::Vue),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::React => "react",
            Framework::Vue => "vue",
        }
    }
}

/// One managed application workspace.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub status: ProjectStatus,
}

/// Width of the hex id suffix embedded in project directory names.
const ID_SUFFIX_LEN: usize = 8;

/// Generate a fresh project id: an 8-char lowercase hex token.
pub fn generate_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..ID_SUFFIX_LEN].to_string()
}

/// Derive a filesystem-safe directory stem from a project name.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash && !out.is_empty() {
            out.push('-');
            prev_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "project".to_string()
    } else {
        trimmed
    }
}

/// Split a project directory name into its name stem and embedded id.
///
/// Returns `None` for the id when the trailing suffix is absent or
/// malformed; callers fall back to a freshly generated id, which breaks id
/// stability for that project across restarts.
pub fn parse_dir_name(dir_name: &str) -> (String, Option<String>) {
    if let Some((stem, suffix)) = dir_name.rsplit_once('-') {
        if suffix.len() == ID_SUFFIX_LEN
            && suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return (stem.to_string(), Some(suffix.to_string()));
        }
    }
    (dir_name.to_string(), None)
}

/// In-memory project catalog. Owned by `DaemonState`; mutated only through
/// lifecycle operations.
pub struct ProjectRegistry {
    projects: HashMap<String, Project>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self {
            projects: HashMap::new(),
        }
    }

    pub fn insert(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    pub fn get(&self, id: &str) -> Option<Project> {
        self.projects.get(id).cloned()
    }

    pub fn remove(&mut self, id: &str) -> Option<Project> {
        self.projects.remove(id)
    }

    pub fn set_status(&mut self, id: &str, status: ProjectStatus) {
        if let Some(project) = self.projects.get_mut(id) {
            project.status = status;
        }
    }

    /// All projects, oldest first.
    pub fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.values().cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        projects
    }

    pub fn ids(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild the project catalog from the workspace root.
///
/// Dev-server state (handles, ports) is never recovered; it only exists for
/// processes the current daemon run has spawned.
pub fn scan_workspace(root: &Path) -> ProjectRegistry {
    let mut registry = ProjectRegistry::new();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan workspace root {}: {e}", root.display());
            return registry;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest = path.join("package.json");
        if !manifest.exists() {
            continue;
        }

        let dir_name = entry.file_name().to_string_lossy().to_string();
        let (name, id) = parse_dir_name(&dir_name);
        let id = id.unwrap_or_else(|| {
            let fresh = generate_id();
            warn!("Directory {dir_name} has no id suffix; assigning fresh id {fresh}");
            fresh
        });

        let framework = detect_framework(&manifest);
        let created_at = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        debug!("Recovered project {id} ({name}) at {}", path.display());
        registry.insert(Project {
            id,
            name,
            framework,
            description: None,
            path,
            created_at,
            status: ProjectStatus::Creating,
        });
    }

    registry
}

/// Derive the framework tag from the manifest's dependency set, first match
/// of the priority list; react when undetermined.
fn detect_framework(manifest: &Path) -> Framework {
    let deps = match read_dependency_names(manifest) {
        Some(deps) => deps,
        None => return Framework::React,
    };
    for (dep, framework) in DETECTION_PRIORITY {
        if deps.iter().any(|d| d == dep) {
            return *framework;
        }
    }
    Framework::React
}

fn read_dependency_names(manifest: &Path) -> Option<Vec<String>> {
    let contents = std::fs::read_to_string(manifest).ok()?;
    let value: Value = serde_json::from_str(&contents).ok()?;
    let mut names = Vec::new();
    for key in ["dependencies", "devDependencies"] {
        if let Some(map) = value.get(key).and_then(Value::as_object) {
            names.extend(map.keys().cloned());
        }
    }
    Some(names)
}
