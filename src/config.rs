//! Runtime configuration using Figment
//!
//! Configuration is layered, lowest to highest precedence:
//! 1. built-in defaults
//! 2. an optional TOML file (`muff.toml` unless `--config` names another)
//! 3. environment variables prefixed with `MUFF_`, `__` separating sections
//!
//! ```text
//! MUFF_DEVICE__PORT=/dev/ttyUSB0
//! MUFF_SESSION__LAMP_TEST=false
//! MUFF_LOG_LEVEL=debug
//! ```
//!
//! Leaving `device.port` unset runs against the simulated positioner, and
//! `capture.simulate = true` runs without the frame grabber.

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file, used when it exists.
pub const DEFAULT_CONFIG_FILE: &str = "muff.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MuffConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Positioner link settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// Frame grabber link settings
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Session behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Positioner serial link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Serial port (e.g., "/dev/ttyUSB0"); unset means simulated
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Time to wait after opening the port while the firmware resets
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Acknowledgement delay of the simulated link
    #[serde(default = "default_simulated_ack_ms")]
    pub simulated_ack_ms: u64,
}

/// Frame grabber named pipes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Run without the frame grabber
    #[serde(default)]
    pub simulate: bool,
    /// Pipe carrying capture requests to the grabber
    #[serde(default = "default_request_pipe")]
    pub request_pipe: PathBuf,
    /// Pipe carrying acknowledgements back
    #[serde(default = "default_reply_pipe")]
    pub reply_pipe: PathBuf,
}

/// Session behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Root directory for scan sets
    #[serde(default = "default_scans_dir")]
    pub scans_dir: PathBuf,
    /// Flash the dome and preview every lighting condition before positioning
    #[serde(default = "default_lamp_test")]
    pub lamp_test: bool,
    /// How long all LEDs stay on during the lamp test
    #[serde(default = "default_lamp_test_on_ms")]
    pub lamp_test_on_ms: u64,
    /// Pause after switching all LEDs off in the lamp test
    #[serde(default = "default_lamp_test_off_ms")]
    pub lamp_test_off_ms: u64,
    /// How long each lighting condition is shown during the preview
    #[serde(default = "default_preview_ms")]
    pub preview_ms: u64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_simulated_ack_ms() -> u64 {
    200
}

fn default_request_pipe() -> PathBuf {
    PathBuf::from("./muff_pipe_m2c")
}

fn default_reply_pipe() -> PathBuf {
    PathBuf::from("./muff_pipe_c2m")
}

fn default_scans_dir() -> PathBuf {
    PathBuf::from("muff_scans")
}

fn default_lamp_test() -> bool {
    true
}

fn default_lamp_test_on_ms() -> u64 {
    1000
}

fn default_lamp_test_off_ms() -> u64 {
    100
}

fn default_preview_ms() -> u64 {
    2000
}

impl Default for MuffConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            device: DeviceConfig::default(),
            capture: CaptureConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            settle_ms: default_settle_ms(),
            simulated_ack_ms: default_simulated_ack_ms(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            request_pipe: default_request_pipe(),
            reply_pipe: default_reply_pipe(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scans_dir: default_scans_dir(),
            lamp_test: default_lamp_test(),
            lamp_test_on_ms: default_lamp_test_on_ms(),
            lamp_test_off_ms: default_lamp_test_off_ms(),
            preview_ms: default_preview_ms(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl MuffConfig {
    /// Load from `muff.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; the defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(MuffConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MUFF_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.device.baud_rate == 0 {
            return Err(ConfigError::Validation(
                "device.baud_rate must be positive".to_string(),
            ));
        }

        if let Some(port) = &self.device.port {
            if port.is_empty() {
                return Err(ConfigError::Validation(
                    "device.port cannot be empty (omit it to simulate)".to_string(),
                ));
            }
        }

        if self.session.scans_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "session.scans_dir cannot be empty".to_string(),
            ));
        }

        // Frame paths travel to the grabber as text.
        if self.session.scans_dir.to_str().is_none() {
            return Err(ConfigError::Validation(format!(
                "session.scans_dir {:?} is not valid UTF-8",
                self.session.scans_dir
            )));
        }

        Ok(())
    }
}
