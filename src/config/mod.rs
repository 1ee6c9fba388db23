//! Configuration module for vimc-rs
//!
//! Holds the simulator configuration: entity construction parameters, the
//! topology to build at startup and logging options. Stored as TOML.
//!
//! # Config Location
//!
//! The default configuration file lives in the platform config directory:
//! - **Linux**: `~/.config/dev.hxyulin.vimc-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.vimc-rs/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.vimc-rs\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use vimc_rs::config::SimConfig;
//!
//! let mut config = SimConfig::load_or_default("vimc.toml");
//! config.pipeline.scaler_multiplier = 2;
//! config.save("vimc.toml")?;
//! ```

pub mod topology;

pub use topology::{EntityConfig, LinkConfig, TopologyConfig};

use crate::error::{Result, SimError};
use crate::pipeline::entities::{
    DEFAULT_DEBAYER_WINDOW, DEFAULT_FRAME_RATE_HZ, DEFAULT_SCALER_MULTIPLIER,
    MAX_SCALER_MULTIPLIER,
};
use crate::pipeline::{EntityParams, FrameLimits, TestPattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.vimc-rs";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info,vimc_rs=debug";

/// Platform config directory for this application.
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Path of the default configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Pipeline ====================

/// Parameters applied to every builtin entity the graph creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generator and consumer rate in Hz; 0 means frames are produced only
    /// on an explicit trigger.
    pub frame_rate_hz: u32,

    /// Scaler upscaling factor
    pub scaler_multiplier: u32,

    /// Debayer mean window size (odd)
    pub debayer_window: u32,

    /// Sensor test pattern
    pub pattern: TestPattern,

    /// Frame size limits used during negotiation
    pub limits: FrameLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            scaler_multiplier: DEFAULT_SCALER_MULTIPLIER,
            debayer_window: DEFAULT_DEBAYER_WINDOW,
            pattern: TestPattern::default(),
            limits: FrameLimits::default(),
        }
    }
}

impl PipelineConfig {
    pub fn entity_params(&self) -> EntityParams {
        EntityParams {
            limits: self.limits,
            frame_rate_hz: self.frame_rate_hz,
            scaler_multiplier: self.scaler_multiplier,
            debayer_window: self.debayer_window,
            pattern: self.pattern,
        }
    }
}

// ==================== Logging ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Directory for a log file in addition to stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

// ==================== Simulator ====================

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub topology: TopologyConfig,
}

impl SimConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)
            .map_err(|e| SimError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML, creating the parent directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SimError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SimError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            SimError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values no entity can be built with.
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.debayer_window % 2 == 0 {
            return Err(SimError::Config(format!(
                "debayer window must be odd, got {}",
                pipeline.debayer_window
            )));
        }
        if !(1..=MAX_SCALER_MULTIPLIER).contains(&pipeline.scaler_multiplier) {
            return Err(SimError::Config(format!(
                "scaler multiplier must be in 1..={}, got {}",
                MAX_SCALER_MULTIPLIER, pipeline.scaler_multiplier
            )));
        }
        if !pipeline.limits.is_valid() {
            return Err(SimError::Config(format!(
                "invalid frame limits {:?}",
                pipeline.limits
            )));
        }
        Ok(())
    }
}
