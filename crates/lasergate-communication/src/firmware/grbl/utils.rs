//! GRBL Protocol Utilities
//!
//! Line normalization and command formatting for GRBL transmission.

/// Normalize a raw command line for transmission
///
/// Removes whitespace, `( ... )` comments and `;` end-of-line comments, and
/// upper-cases the remainder. Non-ASCII characters become `?`. Returns `None`
/// when nothing transmittable is left. The terminating newline is added by the
/// transmitter, not here.
pub fn normalize_line(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut in_comment = false;

    for c in raw.chars() {
        match c {
            '(' => in_comment = true,
            ')' if in_comment => in_comment = false,
            _ if in_comment => {}
            ';' => break,
            c if c.is_whitespace() => {}
            c if !c.is_ascii() => out.push('?'),
            c => out.push(c.to_ascii_uppercase()),
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Bytes the line occupies in the firmware's receive buffer
pub fn transmitted_len(line: &str) -> usize {
    line.len() + 1
}

/// True for `$` system commands other than jogs
///
/// These are the only lines released while the machine is alarmed.
pub fn passes_alarm_lock(line: &str) -> bool {
    line.starts_with('$') && !line.starts_with("$J=")
}

/// Format a relative XY jog using the GRBL 1.1 `$J=` syntax
pub fn jog_command(dx: f64, dy: f64, feed: f64) -> String {
    format!("$J=G91X{:.3}Y{:.3}F{:.0}", dx, dy, feed)
}
