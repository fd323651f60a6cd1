//! # LaserGate Core
//!
//! Core types, traits, and utilities for LaserGate.
//! Provides the data model shared by the streaming engine and its front-ends,
//! the unified error types, the event sink, and the collaborator traits
//! implemented by relay, authorization and job-file backends.

pub mod core;
pub mod data;
pub mod error;

pub use core::{
    event::{EngineEvent, EventDispatcher},
    interlock::{Interlock, JobSource, OperatorAuthorizer, RelayActuator, RelayOutput},
};

pub use data::{ErrorCategory, ErrorEvent, JobId, MachineState, MachineStatusSnapshot, Position};

pub use error::{ConnectionError, ControllerError, Error, Result};
