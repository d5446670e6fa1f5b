//! Override file resolution
//!
//! The override file lives next to the host module:
//! `<host module directory>/rendergate.toml`

use std::path::{Path, PathBuf};

use rendergate_engine::HostModule;

use super::{ConfigError, ConfigResult, EngineConfig};

pub const OVERRIDE_FILE_NAME: &str = "rendergate.toml";

/// Returns the override path for `host`
pub fn override_path(host: HostModule) -> ConfigResult<PathBuf> {
    host.directory()
        .map(|dir| dir.join(OVERRIDE_FILE_NAME))
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Load the override file at `path`
///
/// A missing file is `Ok(None)`.
pub fn load_override(path: &Path) -> ConfigResult<Option<EngineConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let config = EngineConfig::from_toml(&content)?;
    tracing::debug!("Loaded engine config override from {:?}", path);
    Ok(Some(config))
}
