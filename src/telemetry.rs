//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level. When `logging.dir` is set,
//! output goes to a daily-rolling `harbor.log` in that directory instead of
//! stderr; keep the returned guard alive so buffered lines are flushed.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingSection;

const LOG_FILE_PREFIX: &str = "harbor.log";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(logging: &LoggingSection, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        logging.level.clone()
    }
}

pub fn init(logging: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let directive = default_directive(logging, verbose);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log level '{}'", directive))?,
    };

    let (writer, guard, ansi) = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}
