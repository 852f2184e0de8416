//! Workspace-wide constants.
//!
//! Hardware limits of the SPLEBO-N controller stack and the timing defaults
//! used when the configuration file leaves a value unset.

use static_assertions::const_assert;
use std::time::Duration;

/// Number of axis slots on the motion controller (X, Y, Z, U, S1, S2, A, B).
pub const AXIS_COUNT: usize = 8;

/// Axis labels indexed by axis id.
pub const AXIS_NAMES: [&str; AXIS_COUNT] = ["X", "Y", "Z", "U", "S1", "S2", "A", "B"];

/// Addressable CAN I/O boards.
pub const MAX_CAN_BOARDS: usize = 16;

/// Bytes in a board's output (write) buffer.
pub const CAN_WRITE_BUFFER_LEN: usize = 8;

/// Bytes in a board's input (read) buffer.
pub const CAN_READ_BUFFER_LEN: usize = 4;

/// Highest addressable bit in a board buffer.
pub const CAN_MAX_BIT: u8 = 31;

// A CAN 2.0 frame carries at most 8 data bytes.
const_assert!(CAN_WRITE_BUFFER_LEN <= 8);
const_assert!(CAN_READ_BUFFER_LEN <= 8);
const_assert!((CAN_MAX_BIT as usize) < CAN_WRITE_BUFFER_LEN * 8);
const_assert!((CAN_MAX_BIT as usize) < CAN_READ_BUFFER_LEN * 8);
// Board ids are encoded into the low bits of the 11-bit frame id.
const_assert!(MAX_CAN_BOARDS <= 0x40);

/// Default number of slots in the command bridge ring.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 64;
const_assert!(DEFAULT_BRIDGE_CAPACITY.is_power_of_two());

/// Idle wait of the bridge consumer between rescans.
pub const BRIDGE_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// Scheduler tick of the homing state machines.
pub const HOMING_TICK: Duration = Duration::from_millis(10);

/// Default CAN poll cycle interval.
pub const CAN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Device turnaround between two boards in one poll cycle.
pub const CAN_INTER_BOARD_DELAY: Duration = Duration::from_millis(2);

/// Service name used for logging.
pub const SERVICE_NAME: &str = "splebo";

/// Data type tag of the legacy axis-parameter store.
pub const SYS_DATA_TYPE: &str = "SPLEBO-N.SYS";

/// Data type tag of the teaching-point store.
pub const POS_DATA_TYPE: &str = "SPLEBO-N.POS";

/// Store format version understood by both codecs.
pub const STORE_VERSION: &str = "1.00";

/// Timestamp layout written into the stores.
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
