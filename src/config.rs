//! Configuration system using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `LUXDAQ_`, key path separated by `__`
//! 2. TOML configuration file (default: `config/default.toml`)
//!
//! ```text
//! LUXDAQ_APPLICATION__LOG_LEVEL=debug
//! LUXDAQ_CL200A__PORT=/dev/ttyUSB1
//! LUXDAQ_UT382__SYNCED_TIMEOUT_MS=250
//! ```
//!
//! Every field except the serial ports has a default, so an empty file is a
//! valid configuration.

use chrono::format::{Item, StrftimeItems};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub cl200a: Cl200aConfig,
    #[serde(default)]
    pub ut382: Ut382Config,
    /// RGB light actuator; absent when the run does not drive a light.
    #[serde(default)]
    pub actuator: Option<ActuatorConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Konica Minolta CL-200A chroma meter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cl200aConfig {
    /// Serial port; discovered by manufacturer when absent
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_cl200a_baud")]
    pub baud_rate: u32,
    /// Pause after most commands before the instrument is expected to answer
    #[serde(default = "default_command_delay")]
    pub command_delay_ms: u64,
    /// Pause after the EXT-mode command
    #[serde(default = "default_ext_mode_delay")]
    pub ext_mode_delay_ms: u64,
    #[serde(default = "default_cl200a_timeout")]
    pub read_timeout_ms: u64,
    /// Compare the PC-mode acknowledgment against the expected frame
    #[serde(default)]
    pub verify_handshake: bool,
    /// Reject measurement responses whose BCC does not match
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
    /// CCT methods used when a full sample is requested
    #[serde(default = "default_cct_methods")]
    pub cct_methods: Vec<String>,
    /// USB manufacturer string used for port discovery
    #[serde(default = "default_cl200a_manufacturer")]
    pub manufacturer: String,
}

impl Default for Cl200aConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_cl200a_baud(),
            command_delay_ms: default_command_delay(),
            ext_mode_delay_ms: default_ext_mode_delay(),
            read_timeout_ms: default_cl200a_timeout(),
            verify_handshake: false,
            verify_checksum: true,
            cct_methods: default_cct_methods(),
            manufacturer: default_cl200a_manufacturer(),
        }
    }
}

impl Cl200aConfig {
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn ext_mode_delay(&self) -> Duration {
        Duration::from_millis(self.ext_mode_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// UNI-T UT382 streaming luxmeter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ut382Config {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_ut382_baud")]
    pub baud_rate: u32,
    /// Single-byte timeout while looking for frame alignment
    #[serde(default = "default_seek_timeout")]
    pub seek_timeout_ms: u64,
    /// Block timeout once aligned
    #[serde(default = "default_synced_timeout")]
    pub synced_timeout_ms: u64,
    /// chrono format string for sample timestamps
    #[serde(default = "default_strftime")]
    pub strftime: String,
    #[serde(default = "default_ut382_manufacturer")]
    pub manufacturer: String,
    /// "Waiting for device" warnings before going quiet
    #[serde(default = "default_not_ready_warnings")]
    pub not_ready_warnings: u32,
}

impl Default for Ut382Config {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_ut382_baud(),
            seek_timeout_ms: default_seek_timeout(),
            synced_timeout_ms: default_synced_timeout(),
            strftime: default_strftime(),
            manufacturer: default_ut382_manufacturer(),
            not_ready_warnings: default_not_ready_warnings(),
        }
    }
}

impl Ut382Config {
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn synced_timeout(&self) -> Duration {
        Duration::from_millis(self.synced_timeout_ms)
    }
}

/// Line-oriented RGB light controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub port: String,
    #[serde(default = "default_actuator_baud")]
    pub baud_rate: u32,
    /// Wait after opening the port before the first command
    #[serde(default = "default_actuator_settle")]
    pub settle_ms: u64,
    /// Wait between a query and reading its reply
    #[serde(default = "default_actuator_reply_delay")]
    pub reply_delay_ms: u64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "luxmeter_daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cl200a_baud() -> u32 {
    9600
}

fn default_command_delay() -> u64 {
    500
}

fn default_ext_mode_delay() -> u64 {
    125
}

fn default_cl200a_timeout() -> u64 {
    1000
}

fn default_cct_methods() -> Vec<String> {
    vec!["me_mccamy".to_string()]
}

fn default_cl200a_manufacturer() -> String {
    "Prolific".to_string()
}

fn default_ut382_baud() -> u32 {
    19200
}

fn default_seek_timeout() -> u64 {
    20
}

fn default_synced_timeout() -> u64 {
    200
}

fn default_strftime() -> String {
    "%Y-%m-%d %H:%M:%S%.6f".to_string()
}

fn default_ut382_manufacturer() -> String {
    "FTDI".to_string()
}

fn default_not_ready_warnings() -> u32 {
    10
}

fn default_actuator_baud() -> u32 {
    115200
}

fn default_actuator_settle() -> u64 {
    1000
}

fn default_actuator_reply_delay() -> u64 {
    100
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

/// Rejects chrono format strings with unknown specifiers.
pub fn check_strftime(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::ValidationError(format!(
            "Invalid strftime format '{}'",
            format
        )));
    }
    Ok(())
}

impl Settings {
    /// Load configuration from `config/default.toml` and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LUXDAQ_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.cl200a.baud_rate == 0 || self.ut382.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "baud_rate must be greater than zero".to_string(),
            ));
        }

        if self.cl200a.read_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cl200a.read_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.ut382.seek_timeout_ms == 0 || self.ut382.synced_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ut382 timeouts must be greater than zero".to_string(),
            ));
        }

        check_strftime(&self.ut382.strftime)?;

        if self.cl200a.cct_methods.is_empty() {
            return Err(ConfigError::ValidationError(
                "cl200a.cct_methods must name at least one method".to_string(),
            ));
        }

        if let Some(actuator) = &self.actuator {
            if actuator.port.is_empty() {
                return Err(ConfigError::ValidationError(
                    "actuator.port cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
