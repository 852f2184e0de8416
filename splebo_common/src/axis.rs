//! Axis identity, configuration and status.
//!
//! - [`config`] - Per-axis motor family, speeds, limits and homing parameters
//! - [`params`] - The axis-parameter store (TOML and legacy `.sys` codecs)
//! - [`status`] - Live status decoded from controller registers

pub mod config;
pub mod params;
pub mod status;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::consts::{AXIS_COUNT, AXIS_NAMES};
use crate::error::RobotError;

/// Axis index on the motion controller, `0..AXIS_COUNT`.
pub type AxisId = u8;

/// Check an axis id against the controller range.
#[inline]
pub fn check_axis(axis: AxisId) -> Result<AxisId, RobotError> {
    if (axis as usize) < AXIS_COUNT {
        Ok(axis)
    } else {
        Err(RobotError::validation(format!(
            "axis {axis} out of range 0..{AXIS_COUNT}"
        )))
    }
}

/// Display name of an axis (`X`, `Y`, ... `B`).
#[inline]
pub fn axis_name(axis: AxisId) -> &'static str {
    AXIS_NAMES.get(axis as usize).copied().unwrap_or("?")
}

/// Jog direction.
///
/// `Cw` moves toward positive coordinates (soft-limit max), `Ccw` toward
/// negative coordinates (soft-limit min).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JogDirection {
    Cw,
    Ccw,
}

impl JogDirection {
    #[inline]
    pub const fn is_ccw(self) -> bool {
        matches!(self, Self::Ccw)
    }

    #[inline]
    pub const fn from_ccw(ccw: bool) -> Self {
        if ccw { Self::Ccw } else { Self::Cw }
    }

    /// Sign of coordinate change while moving in this direction.
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Cw => 1.0,
            Self::Ccw => -1.0,
        }
    }
}

impl fmt::Display for JogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cw => f.write_str("cw"),
            Self::Ccw => f.write_str("ccw"),
        }
    }
}

impl FromStr for JogDirection {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cw" | "+" | "plus" | "positive" => Ok(Self::Cw),
            "ccw" | "-" | "minus" | "negative" => Ok(Self::Ccw),
            other => Err(RobotError::validation(format!(
                "unknown jog direction '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_range() {
        assert!(check_axis(0).is_ok());
        assert!(check_axis(7).is_ok());
        assert!(check_axis(8).is_err());
        assert_eq!(axis_name(4), "S1");
        assert_eq!(axis_name(42), "?");
    }

    #[test]
    fn direction_parsing() {
        assert_eq!("CW".parse::<JogDirection>().unwrap(), JogDirection::Cw);
        assert_eq!("-".parse::<JogDirection>().unwrap(), JogDirection::Ccw);
        assert!("up".parse::<JogDirection>().is_err());
        assert!(JogDirection::from_ccw(true).is_ccw());
        assert_eq!(JogDirection::Ccw.sign(), -1.0);
    }
}
