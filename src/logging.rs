// ABOUTME: Tracing setup — structured logs go to a file because the TUI owns the terminal.
// ABOUTME: RUST_LOG overrides the configured level.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, before the TUI starts.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let path = config.resolved_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;

    tracing::info!(path = %path.display(), "logging initialized");
    Ok(())
}
