//! Structured logging setup.
//!
//! The filter comes from `STRATUM_LOG`, then `RUST_LOG`, then `[log] level`.
//! The TUI owns the terminal, so it logs to a file; subcommands log to stderr.

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const ENV_VAR: &str = "STRATUM_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
}

fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| level_filter(config))
}

/// The `[log] level` filter used when neither variable is set
fn level_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::new(&config.level)
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(config: &LogConfig, target: LogTarget) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(false);

    let installed = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File => {
            let Some(path) = config.file_path() else {
                // no cache dir
                return Ok(());
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory '{}'", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    if installed.is_err() {
        tracing::debug!("logging already initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_level_is_the_fallback() {
        let config = LogConfig {
            level: "warn".into(),
            file: None,
        };
        assert_eq!(level_filter(&config).to_string(), "warn");
    }

    #[test]
    fn file_target_writes_to_configured_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stratum.log");
        let config = LogConfig {
            level: "info".into(),
            file: Some(path.to_string_lossy().into_owned()),
        };
        init(&config, LogTarget::File).unwrap();
        assert!(path.exists());
    }
}
