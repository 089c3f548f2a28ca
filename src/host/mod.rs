//! Project host: runs one static web server per user project.
//!
//! ## Overview
//!
//! Each project owns a directory under the projects root and a unique TCP
//! port. While a project is running, a dedicated static file server serves
//! its directory on that port. Projects can be paused (server stopped, port
//! kept), started again, or deleted. On boot, every stored project is
//! brought back on its stored port.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  HTTP  ┌───────────────────────────────────────────────────┐
//! │ Collab-  │ ─────> │  server.rs  (Router, ServerConfig, start_server)  │
//! │ orators  │ <───── │    └─ api.rs  (route handlers, AppState)          │
//! └──────────┘        │         │                                         │
//!                     │         v                                         │
//!                     │  lifecycle.rs  (LifecycleManager)                 │
//!                     │    │        │            │              │         │
//!                     │    v        v            v              v         │
//!                     │  ports.rs  db.rs   static_server.rs  registry.rs  │
//!                     │  (alloc)  (SQLite)  (per-project     (running     │
//!                     │                      axum server)     handles)    │
//!                     └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module       | Responsibility                                           |
//! |--------------|----------------------------------------------------------|
//! | `models`     | `Project`, `ProjectView`, `ReconcileReport`, `FileEntry` |
//! | `workspace`  | Project directories, name and path validation, file ops  |
//! | `reconciler` | `reconcile_on_boot()` restores servers after a restart   |
//! | `firewall`   | Optional `ufw allow <port>` hook on create               |
//!
//! ## Create Flow
//!
//! 1. `POST /api/projects` → `LifecycleManager::create_project()`
//! 2. Under the create lock, one store call checks the name, scans for the
//!    first free port from the base, and inserts the record undeployed.
//! 3. The project directory is seeded with `index.html`, a `StaticServer` is
//!    bound to the port and its handle registered.
//! 4. Only then is `deployed` persisted. A failure in step 3 stops the server,
//!    removes the directory and deletes the record.

pub mod api;
pub mod db;
pub mod firewall;
pub mod lifecycle;
pub mod models;
pub mod ports;
pub mod reconciler;
pub mod registry;
pub mod server;
pub mod static_server;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;
