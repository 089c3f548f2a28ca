//! Configuration for Harbor, read from `harbor.toml`.
//!
//! Layering: file → environment → CLI flags. A missing file yields the
//! defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! dev_mode = false
//!
//! [storage]
//! db_path = ".harbor/harbor.db"
//! projects_dir = ".harbor/projects"
//!
//! [ports]
//! base = 3000
//! max_scan = 1000
//!
//! [projects]
//! bind_host = "0.0.0.0"
//! public_host = "localhost"
//! restart_paused = true
//! stop_timeout_ms = 5000
//!
//! [firewall]
//! enabled = false
//! command = "ufw"
//!
//! [logging]
//! level = "info"
//! json = false
//! # dir = ".harbor/logs"
//! ```
//!
//! Environment overrides: `HARBOR_PORT`, `HARBOR_DB_PATH`,
//! `HARBOR_PROJECTS_DIR`, `HARBOR_BASE_PORT`, `HARBOR_LOG`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::host::firewall::FirewallHook;
use crate::host::lifecycle::LifecycleSettings;
use crate::host::ports::{DEFAULT_BASE_PORT, DEFAULT_MAX_SCAN, PortAllocator};

pub const DEFAULT_CONFIG_FILE: &str = "harbor.toml";

/// Management API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for local frontends
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Parent of every project directory
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".harbor/harbor.db")
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from(".harbor/projects")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            projects_dir: default_projects_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortsSection {
    #[serde(default = "default_base_port")]
    pub base: u16,
    #[serde(default = "default_max_scan")]
    pub max_scan: u32,
}

fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

fn default_max_scan() -> u32 {
    DEFAULT_MAX_SCAN
}

impl Default for PortsSection {
    fn default() -> Self {
        Self {
            base: default_base_port(),
            max_scan: default_max_scan(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectsSection {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_public_host")]
    pub public_host: String,
    #[serde(default = "default_restart_paused")]
    pub restart_paused: bool,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_public_host() -> String {
    "localhost".to_string()
}

fn default_restart_paused() -> bool {
    true
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

impl Default for ProjectsSection {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            public_host: default_public_host(),
            restart_paused: default_restart_paused(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_firewall_command")]
    pub command: String,
}

fn default_firewall_command() -> String {
    "ufw".to_string()
}

impl Default for FirewallSection {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_firewall_command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `harbor=debug,tower_http=info`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for a daily-rolling log file; stderr only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

/// Root of `harbor.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarborConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub ports: PortsSection,
    #[serde(default)]
    pub projects: ProjectsSection,
    #[serde(default)]
    pub firewall: FirewallSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HarborConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse harbor.toml")
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from `path` and apply environment overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize harbor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `HARBOR_*` overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = var("HARBOR_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid HARBOR_PORT '{}'", port))?;
        }
        if let Some(path) = var("HARBOR_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(dir) = var("HARBOR_PROJECTS_DIR") {
            self.storage.projects_dir = PathBuf::from(dir);
        }
        if let Some(base) = var("HARBOR_BASE_PORT") {
            self.ports.base = base
                .parse()
                .with_context(|| format!("Invalid HARBOR_BASE_PORT '{}'", base))?;
        }
        if let Some(level) = var("HARBOR_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.ports.base == 0 {
            warnings.push("ports.base is 0; projects would get ephemeral ports".to_string());
        }
        let last = u32::from(self.ports.base).saturating_add(self.ports.max_scan);
        if last > u32::from(u16::MAX) {
            warnings.push(format!(
                "ports.max_scan {} runs past port 65535 from base {}",
                self.ports.max_scan, self.ports.base
            ));
        }
        let api_port = u32::from(self.server.port);
        if api_port >= u32::from(self.ports.base) && api_port < last {
            warnings.push(format!(
                "server.port {} lies inside the project port range {}..{}",
                self.server.port, self.ports.base, last
            ));
        }
        if self.projects.stop_timeout_ms == 0 {
            warnings.push("projects.stop_timeout_ms is 0; servers will be aborted immediately".to_string());
        }
        if self.firewall.enabled && self.firewall.command.trim().is_empty() {
            warnings.push("firewall.enabled is set but firewall.command is empty".to_string());
        }

        warnings
    }

    pub fn allocator(&self) -> PortAllocator {
        PortAllocator::new(self.ports.base, self.ports.max_scan)
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            bind_host: self.projects.bind_host.clone(),
            public_host: self.projects.public_host.clone(),
            stop_timeout: Duration::from_millis(self.projects.stop_timeout_ms),
            restart_paused: self.projects.restart_paused,
        }
    }

    pub fn firewall_hook(&self) -> Option<FirewallHook> {
        self.firewall
            .enabled
            .then(|| FirewallHook::new(self.firewall.command.clone()))
    }
}
