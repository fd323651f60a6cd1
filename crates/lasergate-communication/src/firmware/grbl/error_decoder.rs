//! GRBL Error and Alarm Code Tables
//! Maps numeric `error:n` and `ALARM:n` codes to short and long descriptions

use lasergate_core::{ErrorCategory, ErrorEvent};

/// Short and long description of one code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeDescription {
    /// One-line label suitable for a status bar
    pub short: &'static str,
    /// Full explanation
    pub long: &'static str,
}

const UNKNOWN_ERROR: CodeDescription = CodeDescription {
    short: "Unknown error",
    long: "The firmware reported an error code that is not in the error table.",
};

const UNKNOWN_ALARM: CodeDescription = CodeDescription {
    short: "Unknown alarm",
    long: "The firmware reported an alarm code that is not in the alarm table.",
};

static ERROR_CODES: &[(u16, &str, &str)] = &[
    (1, "Expected command letter", "G-code words consist of a letter and a value. Letter was not found."),
    (2, "Bad number format", "Numeric value format is not valid or missing an expected value."),
    (3, "Invalid statement", "Grbl '$' system command was not recognized or supported."),
    (4, "Value < 0", "Negative value received for an expected positive value."),
    (5, "Setting disabled", "Homing cycle is not enabled via settings."),
    (6, "Value < 3 usec", "Minimum step pulse time must be greater than 3usec."),
    (7, "EEPROM read fail. Using defaults", "EEPROM read failed. Reset and restored to default values."),
    (8, "Not idle", "Grbl '$' command cannot be used unless Grbl is IDLE. Ensures smooth operation during a job."),
    (9, "G-code lock", "G-code locked out during alarm or jog state."),
    (10, "Homing not enabled", "Soft limits cannot be enabled without homing also enabled."),
    (11, "Line overflow", "Max characters per line exceeded. Line was not processed and executed."),
    (12, "Step rate > 30kHz", "Grbl '$' setting value exceeds the maximum step rate supported."),
    (13, "Check Door", "Safety door detected as opened and door state initiated."),
    (14, "Line length exceeded", "Build info or startup line exceeded EEPROM line length limit."),
    (15, "Travel exceeded", "Jog target exceeds machine travel. Command ignored."),
    (16, "Invalid jog command", "Jog command with no '=' or contains prohibited g-code."),
    (17, "Setting disabled", "Laser mode requires PWM output."),
    (20, "Unsupported command", "Unsupported or invalid g-code command found in block."),
    (21, "Modal group violation", "More than one g-code command from same modal group found in block."),
    (22, "Undefined feed rate", "Feed rate has not yet been set or is undefined."),
    (23, "Integer value required", "G-code command in block requires an integer value."),
    (24, "Axis word conflict", "Two G-code commands that both require the use of the XYZ axis words were detected in the block."),
    (25, "Repeated word", "A G-code word was repeated in the block."),
    (26, "No axis words", "A G-code command implicitly or explicitly requires XYZ axis words in the block, but none were detected."),
    (27, "Invalid line number", "N line number value is not within the valid range of 1 - 9,999,999."),
    (28, "Value word missing", "A G-code command was sent, but is missing some required P or L value words in the line."),
    (29, "Unsupported coordinate system", "Grbl supports six work coordinate systems G54-G59. G59.1, G59.2, and G59.3 are not supported."),
    (30, "Invalid G53 motion mode", "The G53 G-code command requires either a G0 seek or G1 feed motion mode to be active."),
    (31, "Unused axis words", "There are unused axis words in the block and G80 motion mode cancel is active."),
    (32, "No arc axis words", "A G2 or G3 arc was commanded but there are no XYZ axis words in the selected plane to trace the arc."),
    (33, "Invalid motion target", "The motion command has an invalid target. G2, G3, and G38.2 generates this error if the arc is impossible to generate or if the probe target is the current position."),
    (34, "Arc radius error", "A G2 or G3 arc, traced with the radius definition, had a mathematical error when computing the arc geometry."),
    (35, "No arc offset words", "A G2 or G3 arc, traced with the offset definition, is missing the IJK offset word in the selected plane to trace the arc."),
    (36, "Unused words", "There are unused, leftover G-code words that aren't used by any command in the block."),
    (37, "Tool length offset axis", "The G43.1 dynamic tool length offset command cannot apply an offset to an axis other than its configured axis."),
    (38, "Tool number exceeded", "Tool number greater than max supported value."),
];

static ALARM_CODES: &[(u16, &str, &str)] = &[
    (1, "Hard limit", "Hard limit triggered. Machine position is likely lost due to sudden and immediate halt. Re-homing is highly recommended."),
    (2, "Soft limit", "Soft limit: G-code motion target exceeds machine travel. Machine position safely retained. Alarm may be unlocked."),
    (3, "Abort during cycle", "Reset while in motion. Grbl cannot guarantee position. Lost steps are likely. Re-homing is highly recommended."),
    (4, "Probe fail", "The probe is not in the expected initial state before starting probe cycle, where G38.2 and G38.3 is not triggered and G38.4 and G38.5 is triggered."),
    (5, "Probe fail", "Probe did not contact the workpiece within the programmed travel for G38.2 and G38.4."),
    (6, "Homing fail", "Reset during active homing cycle."),
    (7, "Homing fail", "Safety door was opened during active homing cycle."),
    (8, "Homing fail", "Cycle failed to clear limit switch when pulling off. Try increasing pull-off setting or check wiring."),
    (9, "Homing fail", "Could not find limit switch within search distance. Defined as 1.5 * max_travel on search and 5 * pulloff on locate phases."),
];

fn lookup(table: &[(u16, &'static str, &'static str)], code: u16) -> Option<CodeDescription> {
    table
        .iter()
        .find(|(entry, _, _)| *entry == code)
        .map(|&(_, short, long)| CodeDescription { short, long })
}

/// Describe a GRBL `error:n` code
pub fn describe_error(code: u16) -> CodeDescription {
    lookup(ERROR_CODES, code).unwrap_or(UNKNOWN_ERROR)
}

/// Describe a GRBL `ALARM:n` code
pub fn describe_alarm(code: u16) -> CodeDescription {
    lookup(ALARM_CODES, code).unwrap_or(UNKNOWN_ALARM)
}

/// Build the sink event for a firmware error or alarm
pub fn error_event(category: ErrorCategory, code: u16) -> ErrorEvent {
    let description = match category {
        ErrorCategory::Alarm => describe_alarm(code),
        ErrorCategory::Error => describe_error(code),
    };
    ErrorEvent::new(category, code, description.short, description.long)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_error() {
        assert_eq!(describe_error(9).short, "G-code lock");
        assert_eq!(
            describe_error(1).long,
            "G-code words consist of a letter and a value. Letter was not found."
        );
        assert_eq!(describe_error(18), UNKNOWN_ERROR);
        assert_eq!(describe_error(255).short, "Unknown error");
    }

    #[test]
    fn test_describe_alarm() {
        assert_eq!(describe_alarm(1).short, "Hard limit");
        assert!(describe_alarm(2).long.contains("Soft limit"));
        assert_eq!(describe_alarm(99).short, "Unknown alarm");
    }

    #[test]
    fn test_error_event_uses_matching_table() {
        let event = error_event(ErrorCategory::Alarm, 1);
        assert_eq!(event.category, ErrorCategory::Alarm);
        assert_eq!(event.short_text, "Hard limit");

        let event = error_event(ErrorCategory::Error, 1);
        assert_eq!(event.short_text, "Expected command letter");
    }
}
