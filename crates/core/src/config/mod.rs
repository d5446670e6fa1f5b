//! Engine configuration
//!
//! The serializable part of [`EngineConfig`] can be overridden by a
//! `rendergate.toml` file placed next to the host module. Callbacks are
//! never read from or written to disk.
//!
//! # Example
//!
//! ```toml
//! [direct3d]
//! hook_direct3d11 = true
//!
//! [logging]
//! level = "trace"
//!
//! [crash_handler]
//! enabled = true
//! dump_type = "full"
//! ```

mod loader;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rendergate_engine::SubsystemKind;
use rendergate_sdk::RgDumpType;

use crate::crash::FaultCallback;
use crate::session::EngineSession;

pub use loader::{load_override, override_path, OVERRIDE_FILE_NAME};

/// Default fallback log file
pub const DEFAULT_LOG_PATH: &str = "%TEMP%/RenderGate.log";

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Host module directory could not be resolved
    #[error("Config directory not available - could not resolve host module path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Direct3DConfig {
    pub hook_direct3d9: bool,
    pub hook_direct3d10: bool,
    pub hook_direct3d11: bool,
    pub hook_direct3d12: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreAudioConfig {
    pub hook_core_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Fallback log file, environment variables expanded
    pub file_path: String,
    /// Filter directive used when `RENDERGATE_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: DEFAULT_LOG_PATH.to_string(),
            level: "debug".to_string(),
        }
    }
}

/// Crash dump verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpType {
    Minimal,
    #[default]
    Normal,
    Full,
}

impl From<RgDumpType> for DumpType {
    fn from(raw: RgDumpType) -> Self {
        match raw {
            RgDumpType::Minimal => DumpType::Minimal,
            RgDumpType::Normal => DumpType::Normal,
            RgDumpType::Full => DumpType::Full,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashHandlerConfig {
    pub enabled: bool,
    /// Dump directory; `None` uses the fallback chain
    pub dump_directory: Option<String>,
    pub dump_type: DumpType,
    /// Gate for the dump file; returning false skips it
    #[serde(skip)]
    pub on_fault: Option<FaultCallback>,
}

impl fmt::Debug for CrashHandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashHandlerConfig")
            .field("enabled", &self.enabled)
            .field("dump_directory", &self.dump_directory)
            .field("dump_type", &self.dump_type)
            .field("on_fault", &self.on_fault.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on waiting for the worker before forced termination
    pub worker_join_ms: u64,
    /// Bound on the in-flight drain before hook removal
    pub drain_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            worker_join_ms: 3000,
            drain_ms: 5000,
        }
    }
}

impl TimeoutConfig {
    pub fn worker_join(&self) -> Duration {
        Duration::from_millis(self.worker_join_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

pub type HookedEvent = Arc<dyn Fn(&EngineSession, SubsystemKind) + Send + Sync>;
pub type SessionEvent = Arc<dyn Fn(&EngineSession) + Send + Sync>;

/// Lifecycle notifications raised to the host
#[derive(Clone, Default)]
pub struct LifecycleEvents {
    /// A render API was identified; raised once per family
    pub on_hooked: Option<HookedEvent>,
    pub pre_unhook: Option<SessionEvent>,
    pub post_unhook: Option<SessionEvent>,
    /// Host process shutdown was detected
    pub pre_exit: Option<SessionEvent>,
}

impl fmt::Debug for LifecycleEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvents")
            .field("on_hooked", &self.on_hooked.is_some())
            .field("pre_unhook", &self.pre_unhook.is_some())
            .field("post_unhook", &self.post_unhook.is_some())
            .field("pre_exit", &self.pre_exit.is_some())
            .finish()
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub direct3d: Direct3DConfig,
    pub core_audio: CoreAudioConfig,
    pub logging: LoggingConfig,
    pub crash_handler: CrashHandlerConfig,
    pub timeouts: TimeoutConfig,
    #[serde(skip)]
    pub events: LifecycleEvents,
}

impl EngineConfig {
    /// Subsystems to resolve, in resolution order
    pub fn enabled_kinds(&self) -> Vec<SubsystemKind> {
        SubsystemKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    pub fn is_enabled(&self, kind: SubsystemKind) -> bool {
        match kind {
            SubsystemKind::Direct3D9 => self.direct3d.hook_direct3d9,
            SubsystemKind::Direct3D10 => self.direct3d.hook_direct3d10,
            SubsystemKind::Direct3D11 => self.direct3d.hook_direct3d11,
            SubsystemKind::Direct3D12 => self.direct3d.hook_direct3d12,
            SubsystemKind::CoreAudio => self.core_audio.hook_core_audio,
        }
    }

    /// Replace the serializable fields with `other`, keeping callbacks
    pub fn merge_file(&mut self, other: EngineConfig) {
        let events = std::mem::take(&mut self.events);
        let on_fault = self.crash_handler.on_fault.take();
        *self = other;
        self.events = events;
        self.crash_handler.on_fault = on_fault;
    }

    /// Parse the serializable fields from TOML
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save the serializable fields to `path`
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        tracing::debug!("Saved engine config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_c_initializer() {
        let config = EngineConfig::default();
        assert!(config.enabled_kinds().is_empty());
        assert!(config.logging.enabled);
        assert_eq!(config.logging.file_path, DEFAULT_LOG_PATH);
        assert!(!config.crash_handler.enabled);
        assert_eq!(config.crash_handler.dump_type, DumpType::Normal);
        assert_eq!(config.timeouts.worker_join(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [direct3d]
            hook_direct3d11 = true

            [crash_handler]
            enabled = true
            dump_type = "full"
            "#,
        )
        .unwrap();

        assert_eq!(config.enabled_kinds(), vec![SubsystemKind::Direct3D11]);
        assert!(config.crash_handler.enabled);
        assert_eq!(config.crash_handler.dump_type, DumpType::Full);
        assert!(config.logging.enabled);
        assert_eq!(config.timeouts.drain_ms, 5000);
    }

    #[test]
    fn test_merge_file_keeps_callbacks() {
        let mut config = EngineConfig::default();
        config.events.pre_exit = Some(Arc::new(|_: &EngineSession| {}));
        config.crash_handler.on_fault = Some(Arc::new(|_: &crate::crash::FaultReport| true));

        let mut file = EngineConfig::default();
        file.core_audio.hook_core_audio = true;
        config.merge_file(file);

        assert!(config.core_audio.hook_core_audio);
        assert!(config.events.pre_exit.is_some());
        assert!(config.crash_handler.on_fault.is_some());
    }

    #[test]
    fn test_toml_roundtrip_skips_callbacks() {
        let mut config = EngineConfig::default();
        config.direct3d.hook_direct3d9 = true;
        config.crash_handler.dump_directory = Some("C:/dumps".into());
        config.events.on_hooked = Some(Arc::new(|_: &EngineSession, _: SubsystemKind| {}));

        let text = config.to_toml().unwrap();
        assert!(text.contains("hook_direct3d9 = true"));
        assert!(!text.contains("on_hooked"));

        let parsed = EngineConfig::from_toml(&text).unwrap();
        assert!(parsed.direct3d.hook_direct3d9);
        assert_eq!(parsed.crash_handler.dump_directory.as_deref(), Some("C:/dumps"));
        assert!(parsed.events.on_hooked.is_none());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = EngineConfig::from_toml("direct3d = 5").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
