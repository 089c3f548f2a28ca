//! Boot-time reconciliation.
//!
//! After a restart the registry is empty but the store still remembers every
//! project. This pass walks the store and brings each project back on its
//! stored port. One project failing never stops the others; the failure is
//! recorded in the report and the project is left paused.

use super::lifecycle::LifecycleManager;
use super::models::{ReconcileFailure, ReconcileReport, ReconciledProject};
use crate::errors::HostResult;

/// Restart stored projects and report what happened.
///
/// Deployed projects are always restarted. Paused projects are restarted
/// only when `restart_paused` is enabled; otherwise their ids land in
/// `skipped`.
///
/// # Errors
///
/// Only a failure to read the store is fatal. Per-project failures are
/// collected in the report.
pub async fn reconcile_on_boot(manager: &LifecycleManager) -> HostResult<ReconcileReport> {
    let restart_paused = manager.settings().restart_paused;
    let projects = manager.all_records().await?;
    let mut report = ReconcileReport::default();

    for project in projects {
        if !project.deployed && !restart_paused {
            report.skipped.push(project.id);
            continue;
        }
        match manager.revive(&project).await {
            Ok(port) => report.started.push(ReconciledProject {
                id: project.id,
                name: project.name,
                port,
            }),
            Err(e) => {
                tracing::warn!(
                    project_id = project.id,
                    name = %project.name,
                    port = project.port,
                    error = %e,
                    "Failed to restore project on boot"
                );
                report.failed.push(ReconcileFailure {
                    id: project.id,
                    name: project.name,
                    port: project.port,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        started = report.started.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "Boot reconciliation complete"
    );
    Ok(report)
}
