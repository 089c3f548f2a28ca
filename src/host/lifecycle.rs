//! Project lifecycle: create, start, pause, delete.
//!
//! ```text
//!                create
//!  NonExistent ─────────> Running <──── start ────┐
//!       ^                   │                     │
//!       │                   └───── pause ────> Paused
//!       └──────────── delete (from either) ───────┘
//! ```
//!
//! Every other transition signals the matching `HostError` instead of
//! silently succeeding. The `deployed` flag is only set after a server has
//! bound its port and been registered, so a bind failure never leaves a
//! record claiming to be live.
//!
//! Locking:
//! - `create_lock` serializes duplicate-name check, port allocation and the
//!   record insert (which additionally run inside one store call).
//! - `project_locks` serializes operations on the same project id; different
//!   projects proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use super::db::DbHandle;
use super::firewall::FirewallHook;
use super::models::{CreatedProject, FileEntry, Project, ProjectView, StartedProject};
use super::ports::PortAllocator;
use super::registry::ServerRegistry;
use super::static_server::{DEFAULT_STOP_TIMEOUT, StaticServer};
use super::workspace::{Workspace, validate_name};
use crate::errors::{HostError, HostResult};

/// Runtime knobs for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Interface project servers bind to.
    pub bind_host: String,
    /// Host name used when building project URLs.
    pub public_host: String,
    pub stop_timeout: Duration,
    /// Whether boot reconciliation also restarts paused projects.
    pub restart_paused: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            public_host: "localhost".to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            restart_paused: true,
        }
    }
}

/// Per-project async locks.
#[derive(Default)]
struct ProjectLocks {
    locks: std::sync::Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    async fn acquire(&self, id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    fn forget(&self, id: i64) {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }
}

pub struct LifecycleManager {
    db: DbHandle,
    registry: Arc<ServerRegistry>,
    workspace: Workspace,
    allocator: PortAllocator,
    firewall: Option<FirewallHook>,
    settings: LifecycleSettings,
    create_lock: Mutex<()>,
    project_locks: ProjectLocks,
}

impl LifecycleManager {
    pub fn new(db: DbHandle, registry: Arc<ServerRegistry>, workspace: Workspace) -> Self {
        Self {
            db,
            registry,
            workspace,
            allocator: PortAllocator::default(),
            firewall: None,
            settings: LifecycleSettings::default(),
            create_lock: Mutex::new(()),
            project_locks: ProjectLocks::default(),
        }
    }

    pub fn with_allocator(mut self, allocator: PortAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_firewall(mut self, firewall: Option<FirewallHook>) -> Self {
        self.firewall = firewall;
        self
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    // ── Internal helpers ──────────────────────────────────────────────

    async fn load(&self, id: i64) -> HostResult<Project> {
        self.db
            .call(move |db| Ok(db.get_project(id)?))
            .await?
            .ok_or(HostError::NotFound { id })
    }

    async fn persist_deployed(&self, id: i64, deployed: bool) -> HostResult<Project> {
        self.db
            .call(move |db| Ok(db.set_deployed(id, deployed)?))
            .await
    }

    async fn ensure_directory(&self, project: &Project) -> HostResult<()> {
        if self.workspace.exists(&project.name).await {
            Ok(())
        } else {
            Err(HostError::DirectoryMissing {
                id: project.id,
                path: self.workspace.project_dir(&project.name),
            })
        }
    }

    /// Bind the project's port, register the handle, then mark it deployed.
    /// Undoes its own partial work on failure.
    async fn launch(&self, project: &Project) -> HostResult<u16> {
        let dir = self.workspace.project_dir(&project.name);
        let handle = StaticServer::new(&dir)
            .bind_host(self.settings.bind_host.clone())
            .stop_timeout(self.settings.stop_timeout)
            .start(project.port)
            .await?;
        let port = handle.port();

        if let Err((err, mut handle)) = self.registry.register(project.id, handle) {
            handle.stop().await;
            return Err(err);
        }

        if let Err(err) = self.persist_deployed(project.id, true).await {
            if let Ok(mut handle) = self.registry.unregister(project.id) {
                handle.stop().await;
            }
            return Err(err);
        }

        tracing::info!(
            project_id = project.id,
            name = %project.name,
            port,
            "Project server running on http://{}:{}",
            self.settings.public_host,
            port
        );
        Ok(port)
    }

    /// Stop and unregister the project's server if one is running.
    async fn halt(&self, id: i64) -> bool {
        match self.registry.unregister(id) {
            Ok(mut handle) => {
                handle.stop().await;
                tracing::info!(project_id = id, "Project server stopped");
                true
            }
            Err(_) => false,
        }
    }

    async fn roll_back_create(&self, project: &Project) {
        self.halt(project.id).await;
        if let Err(e) = self.workspace.remove(&project.name).await {
            tracing::warn!(project_id = project.id, error = %e, "Rollback could not remove project directory");
        }
        let id = project.id;
        if let Err(e) = self.db.call(move |db| Ok(db.delete_project(id)?)).await {
            tracing::warn!(project_id = id, error = %e, "Rollback could not delete project record");
        }
    }

    fn view(&self, project: Project) -> ProjectView {
        let running = self.registry.contains(project.id);
        ProjectView::new(project, running, &self.settings.public_host)
    }

    // ── Lifecycle operations ──────────────────────────────────────────

    /// Create a project: allocate a port, seed its directory, start and
    /// register its server.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `DuplicateName`, `PortExhausted`, `IoFailure`,
    /// `ServerStartFailure`. Failures after the record insert roll back the
    /// record and the directory.
    pub async fn create_project(&self, name: &str, owner_id: i64) -> HostResult<CreatedProject> {
        validate_name(name)?;

        let project = {
            let _create = self.create_lock.lock().await;
            let allocator = self.allocator;
            let name = name.to_string();
            self.db
                .call(move |db| {
                    if db.get_project_by_name(&name)?.is_some() {
                        return Err(HostError::DuplicateName { name });
                    }
                    let port = allocator.allocate(db)?;
                    Ok(db.create_project(&name, owner_id, port)?)
                })
                .await?
        };

        let _guard = self.project_locks.acquire(project.id).await;

        let brought_up = match self.workspace.seed(&project.name).await {
            Ok(_) => self.launch(&project).await,
            Err(e) => Err(e),
        };
        if let Err(err) = brought_up {
            tracing::warn!(name = %project.name, error = %err, "Project creation failed, rolling back");
            self.roll_back_create(&project).await;
            return Err(err);
        }

        if let Some(firewall) = &self.firewall {
            if let Err(e) = firewall.allow_port(project.port).await {
                tracing::warn!(port = project.port, error = %e, "Failed to open port in firewall");
            }
        }

        tracing::info!(project_id = project.id, name = %project.name, owner_id, port = project.port, "Project created");
        Ok(CreatedProject {
            id: project.id,
            port: project.port,
        })
    }

    /// Start a paused project on its existing port.
    pub async fn start_project(&self, id: i64) -> HostResult<StartedProject> {
        let _guard = self.project_locks.acquire(id).await;
        let project = self.load(id).await?;
        if project.deployed || self.registry.contains(id) {
            return Err(HostError::AlreadyRunning { id });
        }
        self.ensure_directory(&project).await?;
        let port = self.launch(&project).await?;
        Ok(StartedProject { port })
    }

    /// Stop a running project. Its port stays reserved.
    pub async fn pause_project(&self, id: i64) -> HostResult<()> {
        let _guard = self.project_locks.acquire(id).await;
        let project = self.load(id).await?;
        if !project.deployed {
            return Err(HostError::AlreadyPaused { id });
        }
        if !self.halt(id).await {
            tracing::warn!(project_id = id, "Project marked deployed but no server was registered");
        }
        self.persist_deployed(id, false).await?;
        tracing::info!(project_id = id, name = %project.name, "Project paused");
        Ok(())
    }

    /// Stop the server (if running), remove the directory, delete the record.
    pub async fn delete_project(&self, id: i64) -> HostResult<()> {
        let guard = self.project_locks.acquire(id).await;
        let project = self.load(id).await?;

        if self.halt(id).await {
            self.persist_deployed(id, false).await?;
        }
        self.workspace.remove(&project.name).await?;
        self.db.call(move |db| Ok(db.delete_project(id)?)).await?;

        drop(guard);
        self.project_locks.forget(id);
        tracing::info!(project_id = id, name = %project.name, "Project deleted");
        Ok(())
    }

    /// Bring a stored project back up during boot reconciliation.
    ///
    /// Unlike `start_project` this ignores the stored `deployed` flag and, on
    /// failure, records `deployed=false` so the store matches reality.
    pub(crate) async fn revive(&self, project: &Project) -> HostResult<u16> {
        let _guard = self.project_locks.acquire(project.id).await;
        if let Some(addr) = self.registry.get(project.id) {
            return Ok(addr.port());
        }
        let result = match self.ensure_directory(project).await {
            Ok(()) => self.launch(project).await,
            Err(e) => Err(e),
        };
        if result.is_err() && project.deployed {
            if let Err(e) = self.persist_deployed(project.id, false).await {
                tracing::warn!(project_id = project.id, error = %e, "Failed to clear deployed flag");
            }
        }
        result
    }

    /// Stop every running server. The `deployed` flags are left untouched so
    /// the next boot restores the same fleet.
    pub async fn shutdown(&self) {
        let mut stops = JoinSet::new();
        for (id, mut handle) in self.registry.drain() {
            stops.spawn(async move {
                handle.stop().await;
                id
            });
        }
        let mut stopped = 0usize;
        while let Some(result) = stops.join_next().await {
            if result.is_ok() {
                stopped += 1;
            }
        }
        tracing::info!(stopped, "Project servers shut down");
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub async fn get_project(&self, id: i64) -> HostResult<ProjectView> {
        let project = self.load(id).await?;
        Ok(self.view(project))
    }

    pub async fn list_projects(&self, owner_id: Option<i64>) -> HostResult<Vec<ProjectView>> {
        let projects = self
            .db
            .call(move |db| {
                Ok(match owner_id {
                    Some(owner) => db.list_projects_by_owner(owner)?,
                    None => db.list_projects()?,
                })
            })
            .await?;
        Ok(projects.into_iter().map(|p| self.view(p)).collect())
    }

    pub(crate) async fn all_records(&self) -> HostResult<Vec<Project>> {
        self.db.call(|db| Ok(db.list_projects()?)).await
    }

    // ── Project files ─────────────────────────────────────────────────

    async fn load_with_directory(&self, id: i64) -> HostResult<Project> {
        let project = self.load(id).await?;
        self.ensure_directory(&project).await?;
        Ok(project)
    }

    pub async fn list_files(&self, id: i64, dir: &str) -> HostResult<Vec<FileEntry>> {
        let project = self.load_with_directory(id).await?;
        self.workspace.list_files(&project.name, dir).await
    }

    pub async fn read_file(&self, id: i64, path: &str) -> HostResult<Vec<u8>> {
        let project = self.load_with_directory(id).await?;
        self.workspace.read_file(&project.name, path).await
    }

    pub async fn write_file(&self, id: i64, path: &str, contents: &[u8]) -> HostResult<()> {
        let _guard = self.project_locks.acquire(id).await;
        let project = self.load_with_directory(id).await?;
        self.workspace.write_file(&project.name, path, contents).await
    }

    pub async fn delete_file(&self, id: i64, path: &str) -> HostResult<()> {
        let _guard = self.project_locks.acquire(id).await;
        let project = self.load_with_directory(id).await?;
        self.workspace.delete_file(&project.name, path).await
    }
}
