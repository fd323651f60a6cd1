//! GRBL protocol constants
//!
//! Timing and buffer figures match the GRBL 1.1 serial interface. Real-time
//! bytes are acted on by the firmware immediately and never enter its
//! receive buffer.

use std::time::Duration;

/// Serial baud rate spoken by GRBL 1.1
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout on the link, also the processing loop's idle tick
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Interval between `?` status polls
pub const SERIAL_POLL: Duration = Duration::from_millis(250);

/// Idle time after which `$G` refreshes the modal state
pub const G_POLL: Duration = Duration::from_secs(10);

/// Size of the firmware's serial receive buffer in bytes
pub const RX_BUFFER_SIZE: usize = 128;

/// How long DTR is held low, then high, to reset the controller on open
pub const RESET_PULSE: Duration = Duration::from_secs(1);

/// How long to wait for the banner after a reset before giving up on it
pub const RESET_TIMEOUT: Duration = Duration::from_secs(2);

/// Prefix of the banner printed by the firmware after every reset
pub const BANNER_PREFIX: &str = "Grbl";

/// Real-time status report request
pub const STATUS_QUERY: u8 = b'?';

/// Real-time feed hold
pub const FEED_HOLD: u8 = b'!';

/// Real-time cycle start / resume
pub const CYCLE_START: u8 = b'~';

/// Real-time soft reset (ctrl-x)
pub const SOFT_RESET: u8 = 0x18;

/// Real-time jog cancel
pub const JOG_CANCEL: u8 = 0x85;

/// Unlock system command
pub const UNLOCK_COMMAND: &str = "$X";

/// Homing cycle system command
pub const HOME_COMMAND: &str = "$H";

/// Parser state (modal) request
pub const MODAL_STATE_COMMAND: &str = "$G";

/// Firmware message marking M2/M30 program end
pub const PROGRAM_END_MESSAGE: &str = "Pgm End";

/// Written after the reset pulse on open; each blank line is answered with `ok`
pub const FLUSH_SEQUENCE: &[u8] = b"\n\n";
