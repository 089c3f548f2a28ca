//! Optional host firewall integration.
//!
//! When enabled, every newly allocated project port is opened with
//! `<command> allow <port>` followed by `<command> reload` (ufw syntax).
//! Failures are reported to the caller, which logs them; a closed firewall
//! never blocks project creation.

use std::process::Stdio;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallHook {
    command: String,
}

impl FirewallHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let output = tokio::process::Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.command))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} {} failed: {}",
                self.command,
                args.join(" "),
                stderr.trim()
            );
        }
        Ok(())
    }

    /// Open `port` and reload the rule set.
    pub async fn allow_port(&self, port: u16) -> Result<()> {
        let port = port.to_string();
        self.run(&["allow", &port]).await?;
        self.run(&["reload"]).await?;
        tracing::info!(port = %port, command = %self.command, "Port allowed in firewall");
        Ok(())
    }
}
