//! Logging bootstrap
//!
//! Installs a global `tracing` subscriber writing to the first log file that
//! can be opened: process directory, host module directory, then the
//! configured fallback path. Falls back to stderr when none opens.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use rendergate_engine::process::{expand_env, process_directory};
use rendergate_engine::HostModule;

use crate::config::LoggingConfig;
use crate::error::EngineError;

/// Environment variable holding a filter directive that beats the config
pub const LOG_ENV: &str = "RENDERGATE_LOG";

pub const LOG_FILE_NAME: &str = "RenderGate.log";

/// Severity of a message forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Log files to try, in order
pub fn log_file_candidates(config: &LoggingConfig, host: Option<HostModule>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(dir) = process_directory() {
        candidates.push(dir.join(LOG_FILE_NAME));
    }
    if let Some(dir) = host.and_then(HostModule::directory) {
        candidates.push(dir.join(LOG_FILE_NAME));
    }
    if !config.file_path.is_empty() {
        candidates.push(PathBuf::from(expand_env(&config.file_path)));
    }
    candidates.dedup();
    candidates
}

/// Open the first candidate that accepts appends
pub fn open_first(candidates: &[PathBuf]) -> Option<(PathBuf, File)> {
    candidates.iter().find_map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(|file| (path.clone(), file))
    })
}

fn build_filter(level: &str) -> Result<EnvFilter, EngineError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| EngineError::LoggerCreation(format!("invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber
///
/// Returns the log file in use, or `None` when logging is disabled or went
/// to stderr. A subscriber that is already installed is kept.
pub fn init(config: &LoggingConfig, host: Option<HostModule>) -> Result<Option<PathBuf>, EngineError> {
    if !config.enabled {
        return Ok(None);
    }

    let filter = build_filter(&config.level)?;
    let (path, writer) = match open_first(&log_file_candidates(config, host)) {
        Some((path, file)) => (Some(path), BoxMakeWriter::new(std::sync::Mutex::new(file))),
        None => (None, BoxMakeWriter::new(std::io::stderr)),
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_writer(writer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Logging to {}", path.as_ref().map_or("stderr".into(), |p| p.display().to_string()));
    } else {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
    Ok(path)
}

/// Forward a host-supplied message into the log
pub fn host_message(level: HostLevel, message: &str) {
    match level {
        HostLevel::Debug => tracing::debug!(target: "rendergate::host", "{}", message),
        HostLevel::Info => tracing::info!(target: "rendergate::host", "{}", message),
        HostLevel::Warning => tracing::warn!(target: "rendergate::host", "{}", message),
        HostLevel::Error => tracing::error!(target: "rendergate::host", "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        let config = LoggingConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init(&config, None).unwrap().is_none());
    }

    #[test]
    fn test_fallback_path_is_expanded_and_last() {
        let config = LoggingConfig {
            file_path: "%TEMP%/fallback.log".into(),
            ..Default::default()
        };
        let candidates = log_file_candidates(&config, None);
        let last = candidates.last().unwrap();
        assert!(last.ends_with("fallback.log"));
        assert!(!last.to_string_lossy().contains('%'));
        if let Some(dir) = process_directory() {
            assert_eq!(candidates[0], dir.join(LOG_FILE_NAME));
        }
    }

    #[test]
    fn test_open_first_skips_unopenable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no").join("such").join("dir").join("a.log");
        let good = dir.path().join("b.log");

        let (path, _file) = open_first(&[missing, good.clone()]).unwrap();
        assert_eq!(path, good);
        assert!(good.exists());
    }

    #[test]
    fn test_invalid_level_is_logger_error() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        let err = build_filter("rendergate=loud").unwrap_err();
        assert!(matches!(err, EngineError::LoggerCreation(_)));
    }
}
