//! Shared fixtures for tests that bind real ports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use tempfile::TempDir;

use super::db::{DbHandle, HostDb};
use super::firewall::FirewallHook;
use super::lifecycle::{LifecycleManager, LifecycleSettings};
use super::ports::PortAllocator;
use super::registry::ServerRegistry;
use super::workspace::Workspace;

/// Tests run in parallel inside one process; each fixture gets its own
/// block of ports so allocations never collide across tests.
static NEXT_BASE_PORT: AtomicU16 = AtomicU16::new(23000);
const PORTS_PER_FIXTURE: u16 = 40;

pub fn next_base_port() -> u16 {
    NEXT_BASE_PORT.fetch_add(PORTS_PER_FIXTURE, Ordering::SeqCst)
}

pub struct Fixture {
    pub tmp: TempDir,
    pub base_port: u16,
    pub settings: LifecycleSettings,
    pub firewall: Option<FirewallHook>,
    pub manager: Arc<LifecycleManager>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(adjust: impl FnOnce(&mut LifecycleSettings)) -> Self {
        Self::build(adjust, None)
    }

    pub fn with_firewall(firewall: FirewallHook) -> Self {
        Self::build(|_| {}, Some(firewall))
    }

    fn build(adjust: impl FnOnce(&mut LifecycleSettings), firewall: Option<FirewallHook>) -> Self {
        let tmp = TempDir::new().unwrap();
        let base_port = next_base_port();
        let mut settings = LifecycleSettings {
            bind_host: "127.0.0.1".to_string(),
            ..LifecycleSettings::default()
        };
        adjust(&mut settings);
        let manager = build_manager(&tmp, base_port, settings.clone(), firewall.clone());
        Self {
            tmp,
            base_port,
            settings,
            firewall,
            manager,
        }
    }

    /// A fresh manager over the same store and project directory, with an
    /// empty registry. Simulates a process restart.
    pub fn reopen(&self) -> Arc<LifecycleManager> {
        build_manager(
            &self.tmp,
            self.base_port,
            self.settings.clone(),
            self.firewall.clone(),
        )
    }
}

fn build_manager(
    tmp: &TempDir,
    base_port: u16,
    settings: LifecycleSettings,
    firewall: Option<FirewallHook>,
) -> Arc<LifecycleManager> {
    let db = HostDb::new(&tmp.path().join("harbor.db")).unwrap();
    let workspace = Workspace::new(tmp.path().join("projects"));
    workspace.ensure_root().unwrap();
    Arc::new(
        LifecycleManager::new(DbHandle::new(db), Arc::new(ServerRegistry::new()), workspace)
            .with_allocator(PortAllocator::new(base_port, u32::from(PORTS_PER_FIXTURE)))
            .with_settings(settings)
            .with_firewall(firewall),
    )
}

/// GET `path` from a project server on localhost.
/// Returns status, content type and body.
pub async fn fetch(port: u16, path: &str) -> reqwest::Result<(u16, String, Vec<u8>)> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()?;
    let resp = client
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .send()
        .await?;
    let status = resp.status().as_u16();
    let ct = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = resp.bytes().await?.to_vec();
    Ok((status, ct, body))
}
