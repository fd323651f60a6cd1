//! Error handling for LaserGate
//!
//! Provides error types for the layers of the streaming engine:
//! - Connection errors (transport failures, fatal to the session)
//! - Controller errors (misuse of the control surface)
//!
//! Firmware-reported `error:n` and `ALARM:n` frames are not Rust errors. They are
//! delivered as [`crate::ErrorEvent`] values on the event sink.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Controller error type
///
/// Represents misuse of the engine's control surface, such as submitting a job
/// while disconnected or while another job is still running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Engine has no open link
    #[error("Controller not connected")]
    NotConnected,

    /// Engine already owns an open link
    #[error("Controller already connected")]
    AlreadyConnected,

    /// A job is already running or paused
    #[error("A job is already in progress")]
    JobInProgress,

    /// A normalized line can never fit in the controller's receive buffer
    #[error("Line '{line}' is {len} bytes, the receive buffer accepts at most {max}")]
    LineTooLong {
        /// The normalized line, without its terminating newline.
        line: String,
        /// Transmitted length including the newline.
        len: usize,
        /// Largest line the flow controller can ever release.
        max: usize,
    },

    /// The machine is alarm locked and must be unlocked or homed first
    #[error("Machine is in alarm state")]
    Alarmed,

    /// A control command was rejected before reaching the link
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },

    /// The processing loop has exited and no longer accepts work
    #[error("Processing loop is not running")]
    WorkerStopped,

    /// The operator authorization check refused access
    #[error("Operator not authorized")]
    NotAuthorized,
}

/// Connection error type
///
/// Represents transport failures on the serial link. Any of these ends the
/// current session: the caller must open the engine again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost while the loop was reading or writing
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for LaserGate
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
