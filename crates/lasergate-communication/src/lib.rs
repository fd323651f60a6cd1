//! # LaserGate Communication
//!
//! Serial transport and the GRBL streaming engine for LaserGate.
//! Lines are pipelined to the controller under character-counting flow
//! control; every received line is classified and reconciled with the
//! in-flight ledger by a single processing loop.

pub mod communication;
pub mod firmware;

pub use communication::{
    buffered::{CommandQueue, InFlightEntry, InFlightLedger, LineOrigin, QueueItem, QueuedLine},
    serial::{list_ports, SerialLink, SerialPortInfo},
    ConnectionParams, Link, StreamConfig,
};

pub use firmware::grbl::{
    classify, describe_alarm, describe_error, normalize_line, Control, GrblEngine, GrblFrame,
    StatusReport, Streamer,
};
