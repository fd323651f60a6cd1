//! Firmware protocol implementations
//!
//! Supported controllers:
//! - GRBL 1.1: character-counting streaming over a serial link

pub mod grbl;

pub use grbl::{GrblEngine, GrblFrame, StatusReport};
