//! LaserGate Settings Crate
//!
//! Loads, validates and saves the engine configuration, and converts it into
//! the parameters the streaming engine is opened with.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, StreamingSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
