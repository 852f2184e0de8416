//! Prelude module for common re-exports.
//!
//! ```rust
//! use splebo_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, RobotConfig, SharedConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ErrorKind, RobotError, RobotResult};

// ─── Axes ───────────────────────────────────────────────────────────
pub use crate::axis::config::{AxisConfig, MotorFamily, OriginDirection, OriginSensorMode};
pub use crate::axis::params::AxisParameterStore;
pub use crate::axis::status::AxisStatus;
pub use crate::axis::{AxisId, JogDirection};

// ─── Hardware boundary ──────────────────────────────────────────────
pub use crate::hal::driver::{HalError, MotionDevice, SpiBus};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{AXIS_COUNT, MAX_CAN_BOARDS};
