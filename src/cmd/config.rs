//! Configuration view and validation commands: `harbor config`.

use std::path::Path;

use anyhow::{Context, Result};

use harbor::config::HarborConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    effective: &HarborConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {}, using defaults", config_path.display());
            }
            println!("# Effective values (with env overrides)");
            println!();
            let rendered =
                toml::to_string_pretty(effective).context("Failed to serialize configuration")?;
            println!("{}", rendered);

            let warnings = effective.validate();
            if !warnings.is_empty() {
                println!("# Warnings:");
                for warning in warnings {
                    println!("#   - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No harbor.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = HarborConfig::load(config_path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("harbor.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }

            HarborConfig::default().save(config_path)?;
            println!("Created harbor.toml at {}", config_path.display());
        }
    }

    Ok(())
}
