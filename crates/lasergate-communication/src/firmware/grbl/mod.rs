//! GRBL firmware support
//!
//! - `constants`: protocol timing, buffer size and real-time bytes
//! - `response_parser`: frame classification of received lines
//! - `error_decoder`: error and alarm code tables
//! - `utils`: line normalization and command formatting
//! - `streamer`: flow-controlled transmitter and run state machine
//! - `controller`: async engine handle and processing loop

pub mod constants;
pub mod controller;
pub mod error_decoder;
pub mod response_parser;
pub mod streamer;
pub mod utils;

pub use controller::GrblEngine;
pub use error_decoder::{describe_alarm, describe_error, error_event, CodeDescription};
pub use response_parser::{classify, GrblFrame, StatusReport};
pub use streamer::{Control, Streamer};
pub use utils::{jog_command, normalize_line, transmitted_len};
