//! Offline project store commands: `harbor init`, `harbor list`.

use anyhow::{Context, Result};

use harbor::config::HarborConfig;
use harbor::host::db::HostDb;
use harbor::host::workspace::Workspace;

fn open_db(config: &HarborConfig) -> Result<HostDb> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    HostDb::new(db_path).context("Failed to initialize project database")
}

pub fn cmd_init(config: &HarborConfig) -> Result<()> {
    open_db(config)?;
    Workspace::new(&config.storage.projects_dir)
        .ensure_root()
        .context("Failed to create projects directory")?;

    println!(
        "Project database initialized at {}",
        config.storage.db_path.display()
    );
    println!(
        "Projects directory: {}",
        config.storage.projects_dir.display()
    );
    Ok(())
}

pub fn cmd_list(config: &HarborConfig, owner: Option<i64>, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let projects = match owner {
        Some(owner) => db.list_projects_by_owner(owner)?,
        None => db.list_projects()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<8} {:<6} {:<9}",
        "ID", "NAME", "OWNER", "PORT", "STATE"
    );
    for project in &projects {
        let state = if project.deployed { "deployed" } else { "paused" };
        println!(
            "{:<6} {:<24} {:<8} {:<6} {:<9}",
            project.id, project.name, project.owner_id, project.port, state
        );
    }
    Ok(())
}
