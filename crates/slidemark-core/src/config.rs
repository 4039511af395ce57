//! Editor configuration and logging setup.

use crate::brush::BrushShape;
use crate::compose::DEFAULT_TOLERANCE_PX;
use crate::painter::DEFAULT_PIXELMAP_DEBOUNCE_MS;
use crate::storage::{Backoff, DEFAULT_INITIAL_RETRY_MS, DEFAULT_MAX_RETRY_MS};
use crate::style::DEFAULT_GROUP_NAME;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current configuration file format version.
pub const CONFIG_VERSION: u32 = 1;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration version {file_version} is newer than supported version {supported_version}")]
    VersionTooNew { file_version: u32, supported_version: u32 },
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Retry policy for failed saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_INITIAL_RETRY_MS,
            max_ms: DEFAULT_MAX_RETRY_MS,
        }
    }
}

impl From<BackoffConfig> for Backoff {
    fn from(config: BackoffConfig) -> Self {
        Backoff::from_millis(config.initial_ms, config.max_ms)
    }
}

/// Brush defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub shape: BrushShape,
    pub size_px: f64,
    /// Fixed size in image units; the screen size then follows the zoom.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_size: Option<f64>,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            shape: BrushShape::Square,
            size_px: 20.0,
            world_size: None,
        }
    }
}

/// Editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub version: u32,
    /// Name of the default style group.
    pub default_group: String,
    pub save_backoff: BackoffConfig,
    /// Curve flattening tolerance in screen pixels.
    pub flatten_tolerance_px: f64,
    pub pixelmap_debounce_ms: u64,
    pub brush: BrushConfig,
    pub log_level: LogLevel,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            default_group: DEFAULT_GROUP_NAME.to_string(),
            save_backoff: BackoffConfig::default(),
            flatten_tolerance_px: DEFAULT_TOLERANCE_PX,
            pixelmap_debounce_ms: DEFAULT_PIXELMAP_DEBOUNCE_MS,
            brush: BrushConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl EditorConfig {
    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Default config file location.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .map(|dir| dir.join("slidemark").join("slidemark-config.json"))
    }
}

/// Initialize the logger at the given level.
///
/// `RUST_LOG` still overrides per-module filters. Calling this more than once
/// is harmless.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging(level: LogLevel) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level.to_level_filter())
        .try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init_logging(level: LogLevel) {
    log::set_max_level(level.to_level_filter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.default_group, "default");
        assert_eq!(config.save_backoff.initial_ms, 5_000);
        assert_eq!(config.save_backoff.max_ms, 300_000);
        assert_eq!(config.pixelmap_debounce_ms, 500);
        assert!((config.flatten_tolerance_px - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EditorConfig::from_json(r#"{"default_group": "background", "brush": {"shape": "circle"}}"#).unwrap();
        assert_eq!(config.default_group, "background");
        assert_eq!(config.brush.shape, BrushShape::Circle);
        assert_eq!(config.brush.size_px, 20.0);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_newer_version_rejected() {
        let result = EditorConfig::from_json(r#"{"version": 99}"#);
        assert!(matches!(result, Err(ConfigError::VersionTooNew { file_version: 99, .. })));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = EditorConfig::default();
        config.log_level = LogLevel::Debug;
        config.brush.world_size = Some(64.0);
        config.save(&path).unwrap();

        let loaded = EditorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_backoff_conversion() {
        let backoff: Backoff = BackoffConfig { initial_ms: 100, max_ms: 1_000 }.into();
        assert_eq!(backoff.delay(5).as_millis(), 1_000);
    }
}
