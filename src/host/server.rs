use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::db::{DbHandle, HostDb};
use super::firewall::FirewallHook;
use super::lifecycle::{LifecycleManager, LifecycleSettings};
use super::ports::PortAllocator;
use super::reconciler::reconcile_on_boot;
use super::registry::ServerRegistry;
use super::workspace::Workspace;
use crate::config::HarborConfig;

/// Configuration for the management server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub projects_dir: PathBuf,
    pub dev_mode: bool,
    pub allocator: PortAllocator,
    pub settings: LifecycleSettings,
    pub firewall: Option<FirewallHook>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&HarborConfig::default())
    }
}

impl From<&HarborConfig> for ServerConfig {
    fn from(config: &HarborConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.storage.db_path.clone(),
            projects_dir: config.storage.projects_dir.clone(),
            dev_mode: config.server.dev_mode,
            allocator: config.allocator(),
            settings: config.lifecycle_settings(),
            firewall: config.firewall_hook(),
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store and project directory and wire up a lifecycle manager.
pub fn open_manager(config: &ServerConfig) -> Result<LifecycleManager> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = HostDb::new(&config.db_path).context("Failed to initialize project database")?;

    let workspace = Workspace::new(&config.projects_dir);
    workspace
        .ensure_root()
        .context("Failed to create projects directory")?;

    Ok(
        LifecycleManager::new(DbHandle::new(db), Arc::new(ServerRegistry::new()), workspace)
            .with_allocator(config.allocator)
            .with_settings(config.settings.clone())
            .with_firewall(config.firewall.clone()),
    )
}

/// Start the management server.
///
/// Reconciles stored projects before accepting requests and stops every
/// project server on the way out.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let manager = Arc::new(open_manager(&config)?);

    let report = reconcile_on_boot(&manager)
        .await
        .context("Failed to reconcile projects on boot")?;
    for failure in &report.failed {
        tracing::warn!(
            project_id = failure.id,
            name = %failure.name,
            kind = %failure.kind,
            "Project left stopped: {}",
            failure.message
        );
    }

    let state = Arc::new(AppState::new(manager.clone()));
    if let Ok(mut last) = state.last_reconcile.lock() {
        *last = Some(report);
    }

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            manager.shutdown().await;
            return Err(e).with_context(|| format!("Failed to bind to {}", addr));
        }
    };

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "Harbor management API listening");
    println!("Harbor running at http://{}", local_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    manager.shutdown().await;
    served?;
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
