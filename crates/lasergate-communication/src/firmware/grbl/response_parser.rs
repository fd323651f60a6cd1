//! GRBL Frame Classifier
//!
//! Sorts every line received from the firmware into one frame category and
//! extracts its structured fields. Categories are recognized only by their
//! leading or embedded markers:
//!
//! | Marker | Frame |
//! |--------|-------|
//! | `<...>` | status report |
//! | `[...]` | informational message |
//! | `ALARM:n` / `error:n` | alarm / error |
//! | banner prefix | firmware reset |
//! | `ok` | acknowledgement |

use super::constants::BANNER_PREFIX;
use lasergate_core::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One classified line from the firmware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrblFrame {
    /// Real-time status report
    StatusReport(StatusReport),
    /// Alarm with its code
    Alarm(u16),
    /// Error response with its code
    Error(u16),
    /// Bracketed message, brackets removed
    Message(String),
    /// Acknowledgement of the oldest buffered line
    Ack,
    /// Startup banner, printed after every firmware reset
    ResetBanner(String),
    /// Anything else
    Unrecognized(String),
}

impl fmt::Display for GrblFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusReport(report) => write!(f, "status:{}", report.state),
            Self::Alarm(code) => write!(f, "ALARM:{}", code),
            Self::Error(code) => write!(f, "error:{}", code),
            Self::Message(msg) => write!(f, "message:{}", msg),
            Self::Ack => write!(f, "ok"),
            Self::ResetBanner(banner) => write!(f, "reset:{}", banner),
            Self::Unrecognized(line) => write!(f, "unrecognized:{}", line),
        }
    }
}

/// GRBL status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state word (`Idle`, `Run`, `Hold:0`, `Alarm`, ...)
    pub state: String,
    /// Every `|`-separated field after the state word
    pub fields: Vec<String>,
    /// Machine position from the `MPos` field, if reported
    pub machine_pos: Option<Position>,
}

impl StatusReport {
    /// State word without a sub-state suffix (`Hold:0` becomes `Hold`)
    pub fn state_name(&self) -> &str {
        self.state.split(':').next().unwrap_or(&self.state)
    }

    /// True when the planner is empty and nothing is moving
    pub fn is_idle(&self) -> bool {
        matches!(self.state_name(), "Idle" | "Check")
    }

    /// True when the firmware itself reports an alarm lock
    pub fn is_alarm(&self) -> bool {
        self.state_name() == "Alarm"
    }
}

/// Classify one received line, already stripped of its line terminator
pub fn classify(line: &str) -> GrblFrame {
    let line = line.trim();

    if line.len() >= 2 && line.starts_with('<') && line.ends_with('>') {
        return GrblFrame::StatusReport(parse_status_report(&line[1..line.len() - 1]));
    }

    if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
        return GrblFrame::Message(line[1..line.len() - 1].to_string());
    }

    let upper = line.to_ascii_uppercase();
    if let Some(idx) = upper.find("ALARM:") {
        return GrblFrame::Alarm(parse_code(&line[idx + "ALARM:".len()..]));
    }
    if let Some(idx) = upper.find("ERROR:") {
        return GrblFrame::Error(parse_code(&line[idx + "ERROR:".len()..]));
    }

    if line.starts_with(BANNER_PREFIX) {
        return GrblFrame::ResetBanner(line.to_string());
    }

    if line.contains("ok") {
        return GrblFrame::Ack;
    }

    GrblFrame::Unrecognized(line.to_string())
}

/// Parse the body of a status report (between `<` and `>`)
fn parse_status_report(body: &str) -> StatusReport {
    let mut parts = body.split('|');
    let state = parts.next().unwrap_or_default().trim().to_string();
    let fields: Vec<String> = parts.map(|p| p.trim().to_string()).collect();

    let machine_pos = fields
        .iter()
        .find_map(|field| field.strip_prefix("MPos:"))
        .and_then(parse_position);

    StatusReport {
        state,
        fields,
        machine_pos,
    }
}

/// Parse `x,y,z` coordinates; extra axes are ignored
///
/// `nan` and `inf` parse as `f64` but are not positions, so they reject the
/// whole field.
fn parse_position(pos_str: &str) -> Option<Position> {
    let mut coords = pos_str
        .split(',')
        .map(|s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()));
    let x = coords.next()??;
    let y = coords.next()??;
    let z = coords.next()??;
    Some(Position::new(x, y, z))
}

/// Leading decimal digits of the text after a colon, 0 when absent
fn parse_code(rest: &str) -> u16 {
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_with_position() {
        let frame = classify("<Idle|MPos:1.500,-2.250,0.000|FS:0,0>");
        let GrblFrame::StatusReport(report) = frame else {
            panic!("expected status report, got {frame:?}");
        };
        assert_eq!(report.state, "Idle");
        assert!(report.is_idle());
        assert_eq!(report.machine_pos, Some(Position::new(1.5, -2.25, 0.0)));
        assert_eq!(report.fields, vec!["MPos:1.500,-2.250,0.000", "FS:0,0"]);
    }

    #[test]
    fn test_status_report_without_mpos() {
        let frame = classify("<Hold:0|WPos:0.000,0.000,0.000>");
        let GrblFrame::StatusReport(report) = frame else {
            panic!("expected status report");
        };
        assert_eq!(report.state_name(), "Hold");
        assert!(!report.is_idle());
        assert_eq!(report.machine_pos, None);
    }

    #[test]
    fn test_non_finite_position_is_dropped() {
        for body in [
            "<Idle|MPos:nan,0.000,0.000|FS:0,0>",
            "<Run|MPos:0.000,inf,0.000>",
            "<Idle|MPos:0.000,0.000,-infinity>",
        ] {
            let GrblFrame::StatusReport(report) = classify(body) else {
                panic!("expected status report for {body}");
            };
            assert_eq!(report.machine_pos, None, "{body}");
        }
    }

    #[test]
    fn test_error_and_alarm_codes() {
        assert_eq!(classify("error:9"), GrblFrame::Error(9));
        assert_eq!(classify("ERROR:22"), GrblFrame::Error(22));
        assert_eq!(classify("ALARM:1"), GrblFrame::Alarm(1));
        assert_eq!(classify("ALARM:2 (soft limit)"), GrblFrame::Alarm(2));
        assert_eq!(classify("error: Bad number format"), GrblFrame::Error(0));
    }

    #[test]
    fn test_message_and_program_end() {
        assert_eq!(
            classify("[MSG:Pgm End]"),
            GrblFrame::Message("MSG:Pgm End".to_string())
        );
        assert_eq!(
            classify("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]"),
            GrblFrame::Message("GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0".to_string())
        );
    }

    #[test]
    fn test_ack_banner_and_unrecognized() {
        assert_eq!(classify("ok"), GrblFrame::Ack);
        assert_eq!(classify("ok\r"), GrblFrame::Ack);
        assert_eq!(
            classify("Grbl 1.1h ['$' for help]"),
            GrblFrame::ResetBanner("Grbl 1.1h ['$' for help]".to_string())
        );
        assert_eq!(
            classify("$0=10"),
            GrblFrame::Unrecognized("$0=10".to_string())
        );
    }

    #[test]
    fn test_status_report_is_never_an_ack() {
        // "ok" inside a status field must not consume a ledger entry
        let frame = classify("<Idle|MPos:0.000,0.000,0.000|Pn:ok>");
        assert!(matches!(frame, GrblFrame::StatusReport(_)));
    }
}
