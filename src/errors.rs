//! Typed error taxonomy for the project host.
//!
//! Every lifecycle operation signals one of these variants so the management
//! API (or any other collaborator) can translate it into a user-facing
//! response without string matching. Plumbing layers underneath (the SQLite
//! store, config loading, the CLI) use `anyhow` and surface here as
//! `HostError::Database` when they bubble up through a lifecycle call.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the project server lifecycle subsystem.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("A project named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Project {id} not found")]
    NotFound { id: i64 },

    #[error("Project {id} is already running")]
    AlreadyRunning { id: i64 },

    #[error("Project {id} is already paused")]
    AlreadyPaused { id: i64 },

    #[error("No server registered for project {id}")]
    NotRunning { id: i64 },

    #[error("No free port found after scanning {scanned} ports from {base}")]
    PortExhausted { base: u16, scanned: u32 },

    #[error("Directory for project {id} is missing: {}", path.display())]
    DirectoryMissing { id: i64, path: PathBuf },

    #[error("Failed to start server on port {port}: {source}")]
    ServerStartFailure {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O failure at {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid file path '{path}'")]
    InvalidPath { path: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl HostError {
    /// Stable snake_case identifier for the variant, used in API error bodies
    /// and reconcile reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "duplicate_name",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyRunning { .. } => "already_running",
            Self::AlreadyPaused { .. } => "already_paused",
            Self::NotRunning { .. } => "not_running",
            Self::PortExhausted { .. } => "port_exhausted",
            Self::DirectoryMissing { .. } => "directory_missing",
            Self::ServerStartFailure { .. } => "server_start_failure",
            Self::IoFailure { .. } => "io_failure",
            Self::InvalidName { .. } => "invalid_name",
            Self::InvalidPath { .. } => "invalid_path",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Database(_) => "database",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;
