//! Data models for machine state, position, and firmware-reported errors
//!
//! This module provides:
//! - The engine's machine state machine values
//! - Machine position parsed from status reports
//! - Error events raised by `error:n` and `ALARM:n` frames
//! - The immutable status snapshot published to front-ends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Machine state as tracked by the streaming engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MachineState {
    /// No open link
    #[default]
    Disconnected,
    /// Connected, no job running
    Idle,
    /// A job is being streamed
    Running,
    /// Feed hold issued, job resumable
    Paused,
    /// Firmware raised an alarm, cleared only by unlock
    Alarmed,
}

impl MachineState {
    /// True for every state except `Disconnected`
    pub fn is_connected(&self) -> bool {
        !matches!(self, MachineState::Disconnected)
    }

    /// True while a job is running or paused
    pub fn has_active_job(&self) -> bool {
        matches!(self, MachineState::Running | MachineState::Paused)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Disconnected => write!(f, "Disconnected"),
            MachineState::Idle => write!(f, "Idle"),
            MachineState::Running => write!(f, "Running"),
            MachineState::Paused => write!(f, "Paused"),
            MachineState::Alarmed => write!(f, "Alarmed"),
        }
    }
}

/// Machine coordinates from the most recent `MPos` field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        debug_assert!(
            x.is_finite() && y.is_finite() && z.is_finite(),
            "Position axes must be finite: x={x}, y={y}, z={z}"
        );
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Category of a firmware-reported problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// `ALARM:n` frame
    Alarm,
    /// `error:n` frame
    Error,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Alarm => write!(f, "ALARM"),
            ErrorCategory::Error => write!(f, "ERROR"),
        }
    }
}

/// A firmware error or alarm, surfaced once per occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Alarm or error
    pub category: ErrorCategory,
    /// Numeric code reported by the firmware
    pub code: u16,
    /// Short description from the code tables
    pub short_text: String,
    /// Long description from the code tables
    pub long_text: String,
    /// When the frame was received
    pub raised_at: DateTime<Utc>,
}

impl ErrorEvent {
    /// Create an event stamped with the current time
    pub fn new(
        category: ErrorCategory,
        code: u16,
        short_text: impl Into<String>,
        long_text: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            short_text: short_text.into(),
            long_text: long_text.into(),
            raised_at: Utc::now(),
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.category, self.code, self.short_text)
    }
}

/// Identifier handed out for every submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new unique job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", &self.0.to_string()[..8])
    }
}

/// Copy of the engine's observable state
///
/// Published by the processing loop after every tick. Readers always get an
/// owned copy, never a reference into the loop's own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MachineStatusSnapshot {
    /// Current machine state
    pub state: MachineState,
    /// Last known machine position, `None` until the first status report
    pub position: Option<Position>,
    /// Acknowledged job lines divided by total job lines
    pub progress: f64,
    /// Most recent raw status/ack/error line
    pub status_line: String,
    /// Lines and sentinels waiting in the command queue
    pub queued: usize,
    /// Lines written but not yet acknowledged
    pub in_flight_lines: usize,
    /// Bytes written but not yet acknowledged
    pub in_flight_bytes: usize,
    /// Job currently tracked for progress
    pub job: Option<JobId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_state_predicates() {
        assert!(!MachineState::Disconnected.is_connected());
        assert!(MachineState::Alarmed.is_connected());
        assert!(MachineState::Paused.has_active_job());
        assert!(!MachineState::Idle.has_active_job());
        assert_eq!(MachineState::default(), MachineState::Disconnected);
    }

    #[test]
    fn test_error_event_display() {
        let event = ErrorEvent::new(ErrorCategory::Alarm, 1, "Hard limit", "Hard limit triggered.");
        assert_eq!(event.to_string(), "ALARM:1 Hard limit");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MachineStatusSnapshot {
            state: MachineState::Running,
            position: Some(Position::new(1.5, -2.25, 0.0)),
            progress: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MachineStatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
