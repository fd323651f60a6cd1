//! # LaserGate
//!
//! Streaming G-code sender for GRBL-class laser cutters and CNC controllers.
//!
//! ## Architecture
//!
//! LaserGate is organized as a workspace with multiple crates:
//!
//! 1. **lasergate-core** - Data model, error types, event sink, collaborator traits
//! 2. **lasergate-communication** - Serial link, frame classifier, flow-controlled streaming engine
//! 3. **lasergate-settings** - Configuration files and validation
//! 4. **lasergate** - This facade, the file job source and the `lasergate` binary
//!
//! ## Features
//!
//! - **Character-counting flow control**: never more than `RX_BUFFER_SIZE - 1` bytes in flight
//! - **Real-time control**: feed hold, resume, soft reset and jog cancel bypass the queue
//! - **Alarm handling**: error and alarm codes decoded to readable descriptions
//! - **Operator interlock**: relay outputs energized only for authorized operators

pub mod job;

pub use lasergate_communication::firmware;
pub use lasergate_core::data;

pub use lasergate_core::{
    ConnectionError, ControllerError, EngineEvent, Error, ErrorCategory, ErrorEvent,
    EventDispatcher, Interlock, JobId, JobSource, MachineState, MachineStatusSnapshot,
    OperatorAuthorizer, Position, RelayActuator, RelayOutput, Result,
};

pub use lasergate_communication::{
    list_ports, ConnectionParams, GrblEngine, Link, SerialLink, SerialPortInfo, StreamConfig,
};

pub use lasergate_settings::{Config, ConnectionSettings, SettingsError, StreamingSettings};

pub use job::GcodeFile;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Output on stderr, leaving stdout to the event stream
/// - RUST_LOG environment variable support, `info` otherwise
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::Pretty)
}

/// Initialize logging in the given format
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }

    Ok(())
}
