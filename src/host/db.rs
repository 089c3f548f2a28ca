use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::Project;
use crate::errors::HostResult;

/// Async-safe handle to the project store.
///
/// Wraps `HostDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads. Everything inside one `call`
/// closure runs under the mutex, which makes multi-statement sequences
/// (port scan followed by insert) a single critical section.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<HostDb>>,
}

impl DbHandle {
    pub fn new(db: HostDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> HostResult<R>
    where
        F: FnOnce(&HostDb) -> HostResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct HostDb {
    conn: Connection,
}

const PROJECT_COLUMNS: &str = "id, name, owner_id, port, deployed, created_at, updated_at";

impl HostDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure SQLite pragmas")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    owner_id INTEGER NOT NULL,
                    port INTEGER NOT NULL UNIQUE,
                    deployed INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    /// Insert a new record. The project starts out undeployed; the lifecycle
    /// manager flips the flag once its server is actually bound.
    pub fn create_project(&self, name: &str, owner_id: i64, port: u16) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (name, owner_id, port) VALUES (?1, ?2, ?3)",
                params![name, owner_id, port],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.query_one(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            params![id],
        )
    }

    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.query_one(
            &format!("SELECT {} FROM projects WHERE name = ?1", PROJECT_COLUMNS),
            params![name],
        )
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.query_many(
            &format!("SELECT {} FROM projects ORDER BY id", PROJECT_COLUMNS),
            params![],
        )
    }

    pub fn list_projects_by_owner(&self, owner_id: i64) -> Result<Vec<Project>> {
        self.query_many(
            &format!(
                "SELECT {} FROM projects WHERE owner_id = ?1 ORDER BY id",
                PROJECT_COLUMNS
            ),
            params![owner_id],
        )
    }

    pub fn port_in_use(&self, port: u16) -> Result<bool> {
        let taken: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM projects WHERE port = ?1",
                params![port],
                |row| row.get(0),
            )
            .context("Failed to query port occupancy")?;
        Ok(taken)
    }

    pub fn set_deployed(&self, id: i64, deployed: bool) -> Result<Project> {
        self.conn
            .execute(
                "UPDATE projects SET deployed = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![deployed, id],
            )
            .context("Failed to update deployed flag")?;
        self.get_project(id)?
            .context("Project not found after deployed update")
    }

    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(count > 0)
    }

    // ── Row helpers ───────────────────────────────────────────────────

    fn query_one(&self, sql: &str, args: impl rusqlite::Params) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare project query")?;
        let row = stmt
            .query_row(args, ProjectRow::from_row)
            .optional()
            .context("Failed to query project")?;
        row.map(ProjectRow::into_project).transpose()
    }

    fn query_many(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare project list query")?;
        let rows = stmt
            .query_map(args, ProjectRow::from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            let r = row.context("Failed to read project row")?;
            projects.push(r.into_project()?);
        }
        Ok(projects)
    }
}

/// Intermediate row struct for projects.
struct ProjectRow {
    id: i64,
    name: String,
    owner_id: i64,
    port: i64,
    deployed: bool,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            owner_id: row.get(2)?,
            port: row.get(3)?,
            deployed: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_project(self) -> Result<Project> {
        let port = u16::try_from(self.port)
            .with_context(|| format!("Stored port {} for project {} is out of range", self.port, self.id))?;
        Ok(Project {
            id: self.id,
            name: self.name,
            owner_id: self.owner_id,
            port,
            deployed: self.deployed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
