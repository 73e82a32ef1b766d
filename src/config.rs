//! # Startup Configuration
//!
//! Read once at startup from a TOML file; nothing here changes at runtime.
//!
//! ```toml
//! [identity]
//! manufacturer = "SAIL-Nexus"
//! model = "SAIL MultiLaser-TTL"
//! serial = "00001"
//! firmware = "1.0.0-SCPI"
//!
//! [channels]
//! count = 3
//! polarity = "active_high"
//!
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channels::{Polarity, MAX_CHANNELS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Strings reported by `*IDN?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            manufacturer: String::from("SAIL-Nexus"),
            model: String::from("SAIL MultiLaser-TTL"),
            serial: String::from("00001"),
            firmware: String::from("1.0.0-SCPI"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub count: usize,
    pub polarity: Polarity,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            count: 3,
            polarity: Polarity::ActiveHigh,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub identity: DeviceIdentity,
    pub channels: ChannelConfig,
    pub serial: SerialConfig,
}

impl DeviceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.count == 0 || self.channels.count > MAX_CHANNELS {
            return Err(ConfigError::Validation(format!(
                "channel count must be between 1 and {}, got {}",
                MAX_CHANNELS, self.channels.count
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Validation(String::from("baud rate must be non-zero")));
        }
        Ok(())
    }
}
