use serde::{Deserialize, Serialize};

/// Persisted project record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub port: u16,
    pub deployed: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Returned by `create_project`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedProject {
    pub id: i64,
    pub port: u16,
}

/// Returned by `start_project`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartedProject {
    pub port: u16,
}

/// A project record joined with live registry state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub port: u16,
    pub deployed: bool,
    /// Whether a server handle is currently registered for this project.
    pub running: bool,
    pub url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ProjectView {
    pub fn new(project: Project, running: bool, public_host: &str) -> Self {
        Self {
            url: format!("http://{}:{}", public_host, project.port),
            id: project.id,
            name: project.name,
            owner_id: project.owner_id,
            port: project.port,
            deployed: project.deployed,
            running,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// A project the reconciler brought back up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciledProject {
    pub id: i64,
    pub name: String,
    pub port: u16,
}

/// A project the reconciler could not start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub id: i64,
    pub name: String,
    pub port: u16,
    /// `HostError::kind()` of the failure, e.g. `directory_missing`.
    pub kind: String,
    pub message: String,
}

/// Outcome of boot-time reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub started: Vec<ReconciledProject>,
    pub failed: Vec<ReconcileFailure>,
    /// Paused projects left stopped because `restart_paused` is off.
    pub skipped: Vec<i64>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One entry of a project directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}
