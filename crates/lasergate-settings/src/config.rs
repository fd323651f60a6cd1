//! Configuration management for LaserGate
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats; the default file lives in the
//! platform configuration directory.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, read timeout)
//! - Streaming settings (poll intervals, receive buffer, reset timing)

use crate::error::{ConfigError, SettingsError, SettingsResult};
use lasergate_communication::firmware::grbl::constants::{
    BAUD_RATE, G_POLL, RESET_PULSE, RESET_TIMEOUT, RX_BUFFER_SIZE, SERIAL_POLL, SERIAL_TIMEOUT,
};
use lasergate_communication::{ConnectionParams, StreamConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest receive buffer accepted; GRBL ports with bigger buffers exist
const MAX_RX_BUFFER_SIZE: usize = 16 * 1024;

/// Upper bound for every interval setting (one minute)
const MAX_INTERVAL_MS: u64 = 60_000;

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port, may be left empty and given on the command line
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: BAUD_RATE,
            timeout_ms: SERIAL_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ConnectionSettings {
    /// Parameters for opening the link, optionally overriding the port
    pub fn to_params(&self, port: Option<&str>) -> ConnectionParams {
        ConnectionParams {
            port: port.unwrap_or(&self.port).to_string(),
            baud_rate: self.baud_rate,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Streaming engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Interval between `?` status polls
    pub status_poll_ms: u64,
    /// Idle time before the modal state is refreshed
    pub modal_poll_ms: u64,
    /// Firmware receive buffer size in bytes
    pub rx_buffer_size: usize,
    /// DTR low and high hold time when opening
    pub reset_pulse_ms: u64,
    /// How long to wait for the banner after a reset
    pub reset_timeout_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            status_poll_ms: SERIAL_POLL.as_millis() as u64,
            modal_poll_ms: G_POLL.as_millis() as u64,
            rx_buffer_size: RX_BUFFER_SIZE,
            reset_pulse_ms: RESET_PULSE.as_millis() as u64,
            reset_timeout_ms: RESET_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StreamingSettings {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            status_poll: Duration::from_millis(self.status_poll_ms),
            modal_poll: Duration::from_millis(self.modal_poll_ms),
            rx_buffer_size: self.rx_buffer_size,
            reset_pulse: Duration::from_millis(self.reset_pulse_ms),
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file: `<config_dir>/lasergate/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("lasergate").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load the default config file, or defaults when it does not exist
    pub fn load_or_default() -> SettingsResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let connection = &self.connection;
        if connection.baud_rate == 0 {
            return Err(ConfigError::out_of_range("connection.baud_rate", connection.baud_rate));
        }
        if connection.timeout_ms == 0 || connection.timeout_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::out_of_range("connection.timeout_ms", connection.timeout_ms));
        }

        let streaming = &self.streaming;
        if streaming.rx_buffer_size < 2 || streaming.rx_buffer_size > MAX_RX_BUFFER_SIZE {
            return Err(ConfigError::out_of_range(
                "streaming.rx_buffer_size",
                streaming.rx_buffer_size,
            ));
        }

        let intervals = [
            ("streaming.status_poll_ms", streaming.status_poll_ms, false),
            ("streaming.modal_poll_ms", streaming.modal_poll_ms, false),
            ("streaming.reset_pulse_ms", streaming.reset_pulse_ms, true),
            ("streaming.reset_timeout_ms", streaming.reset_timeout_ms, false),
        ];
        for (key, value, zero_allowed) in intervals {
            if (value == 0 && !zero_allowed) || value > MAX_INTERVAL_MS {
                return Err(ConfigError::out_of_range(key, value));
            }
        }

        Ok(())
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.connection.baud_rate, 115_200);
        assert_eq!(config.connection.timeout_ms, 100);
        assert_eq!(config.streaming.status_poll_ms, 250);
        assert_eq!(config.streaming.modal_poll_ms, 10_000);
        assert_eq!(config.streaming.rx_buffer_size, 128);
        assert_eq!(config.streaming.reset_pulse_ms, 1_000);
        assert_eq!(config.streaming.reset_timeout_ms, 2_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.streaming.rx_buffer_size = 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::out_of_range("streaming.rx_buffer_size", 1))
        );

        let mut config = Config::default();
        config.streaming.status_poll_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.streaming.reset_pulse_ms = 0;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.connection.timeout_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conversion_to_engine_parameters() {
        let mut config = Config::default();
        config.connection.port = "/dev/ttyUSB0".to_string();

        let params = config.connection.to_params(None);
        assert_eq!(params, ConnectionParams::new("/dev/ttyUSB0"));
        assert_eq!(config.connection.to_params(Some("COM4")).port, "COM4");
        assert_eq!(config.streaming.to_stream_config(), StreamConfig::default());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[connection]\nport = \"COM3\"\n").unwrap();
        assert_eq!(config.connection.port, "COM3");
        assert_eq!(config.connection.baud_rate, 115_200);
        assert_eq!(config.streaming, StreamingSettings::default());
    }

    #[test]
    fn test_default_path_is_under_lasergate() {
        if let Ok(path) = Config::default_path() {
            assert!(path.ends_with("lasergate/config.toml"));
        }
    }
}
