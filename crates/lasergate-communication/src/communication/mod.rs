//! Byte transport to the controller and stream tuning
//!
//! The processing loop talks to the firmware through the [`Link`] trait only.
//! [`serial::SerialLink`] is the production implementation; tests substitute an
//! in-memory link.

pub mod buffered;
pub mod serial;

use crate::firmware::grbl::constants::{
    BAUD_RATE, G_POLL, RESET_PULSE, RESET_TIMEOUT, RX_BUFFER_SIZE, SERIAL_POLL, SERIAL_TIMEOUT,
};
use lasergate_core::{ConnectionError, Result};
use std::io;
use std::time::Duration;

/// Bidirectional byte stream to the controller
///
/// Implementations are used from a single thread at a time: the processing
/// loop owns the link for the whole session.
pub trait Link: Send {
    /// Identifier of the underlying device, used in logs and events
    fn name(&self) -> String;

    /// Write every byte or fail
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read available bytes, blocking up to the link timeout
    ///
    /// Returns `Ok(0)` when the timeout elapsed without data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Drive the DTR control line
    fn set_dtr(&mut self, level: bool) -> io::Result<()>;
}

/// Parameters for opening a serial link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Device path or COM port name
    pub port: String,
    /// Baud rate, 8 data bits, no parity, one stop bit
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// Parameters for `port` at the GRBL defaults
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Read timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject parameters no serial device accepts
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port name is empty".to_string(),
            }
            .into());
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be positive".to_string(),
            }
            .into());
        }
        if self.timeout_ms == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "read timeout must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: BAUD_RATE,
            timeout_ms: SERIAL_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Timing and buffer figures used by the processing loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Interval between `?` status polls
    pub status_poll: Duration,
    /// Idle time after which `$G` is issued
    pub modal_poll: Duration,
    /// Firmware receive buffer size in bytes
    pub rx_buffer_size: usize,
    /// Length of each DTR phase when resetting on open
    pub reset_pulse: Duration,
    /// How long to wait for the banner after a reset
    pub reset_timeout: Duration,
}

impl StreamConfig {
    /// Largest transmitted line (newline included) that can ever be released
    pub fn max_line_len(&self) -> usize {
        self.rx_buffer_size.saturating_sub(1)
    }

    /// Reject figures that would stall the loop
    pub fn validate(&self) -> Result<()> {
        if self.rx_buffer_size < 2 {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("receive buffer of {} bytes is too small", self.rx_buffer_size),
            }
            .into());
        }
        if self.status_poll.is_zero() {
            return Err(ConnectionError::InvalidParameters {
                reason: "status poll interval must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            status_poll: SERIAL_POLL,
            modal_poll: G_POLL,
            rx_buffer_size: RX_BUFFER_SIZE,
            reset_pulse: RESET_PULSE,
            reset_timeout: RESET_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_params_defaults() {
        let params = ConnectionParams::new("/dev/ttyUSB0");
        assert_eq!(params.baud_rate, 115_200);
        assert_eq!(params.timeout(), Duration::from_millis(100));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_connection_params_rejects_empty_port() {
        let err = ConnectionParams::default().validate().unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.rx_buffer_size, 128);
        assert_eq!(config.max_line_len(), 127);
        assert_eq!(config.status_poll, Duration::from_millis(250));
        assert_eq!(config.modal_poll, Duration::from_secs(10));
        assert!(config.validate().is_ok());

        let tiny = StreamConfig {
            rx_buffer_size: 1,
            ..StreamConfig::default()
        };
        assert!(tiny.validate().is_err());
    }
}
