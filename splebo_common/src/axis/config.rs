//! Per-axis configuration.
//!
//! An [`AxisConfig`] is created from the axis-parameter store at startup and
//! is immutable once the axis is initialized on the controller. Lengths are
//! in mm, speeds in mm/s, acceleration in controller units.
//!
//! # TOML Example
//!
//! ```toml
//! [[axes]]
//! motor = "actuator_a"
//! max_speed = 300.0
//! max_accel = 2000.0
//! max_decel = 2000.0
//! start_speed = 10.0
//! offset_speed = 20.0
//! origin_speed = 20.0
//! origin_offset = 0.0
//! limit_plus = 300.5
//! limit_minus = 0.0
//! pulse_length = 0.01
//! origin_order = 1
//! origin_dir = "ccw"
//! origin_sensor = "auto"
//! in_position = true
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::consts::AXIS_COUNT;

// ─── Enums ──────────────────────────────────────────────────────────

/// Motor family driving an axis.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MotorFamily {
    /// Axis slot not populated.
    #[default]
    None = 0,
    /// Servo actuator with a drive-side homing routine.
    ActuatorA = 1,
    /// Open-loop stepping motor.
    SteppingMotor = 2,
    /// Closed-loop stepping actuator.
    ActuatorB = 3,
}

impl MotorFamily {
    /// Decode from the parameter store value. Unknown values mean `None`.
    #[inline]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ActuatorA,
            2 => Self::SteppingMotor,
            3 => Self::ActuatorB,
            _ => Self::None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_configured(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Origin sensor usage during homing.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginSensorMode {
    /// Sensor not checked.
    #[default]
    Off = 0,
    /// Sensor must be active after the homing move.
    On = 1,
    /// Controller performs its own origin search.
    Auto = 2,
}

impl OriginSensorMode {
    #[inline]
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::Auto),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Direction of the controller-driven origin search.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginDirection {
    /// Search toward negative coordinates.
    #[default]
    Ccw = 0,
    /// Search toward positive coordinates.
    Cw = 1,
}

impl OriginDirection {
    #[inline]
    pub const fn from_u8(v: u8) -> Self {
        if v == 0 { Self::Ccw } else { Self::Cw }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// ─── AxisConfig ─────────────────────────────────────────────────────

/// Configuration of one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    #[serde(default)]
    pub motor: MotorFamily,
    /// Maximum drive speed [mm/s].
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    #[serde(default = "default_accel")]
    pub max_accel: f64,
    #[serde(default = "default_accel")]
    pub max_decel: f64,
    /// Start (initial) speed [mm/s].
    #[serde(default = "default_start_speed")]
    pub start_speed: f64,
    /// Speed of the post-homing offset move [mm/s].
    #[serde(default = "default_homing_speed")]
    pub offset_speed: f64,
    /// Speed of the origin search [mm/s].
    #[serde(default = "default_homing_speed")]
    pub origin_speed: f64,
    /// Relative move applied after the origin is found [mm].
    #[serde(default)]
    pub origin_offset: f64,
    /// Soft-limit maximum [mm].
    #[serde(default = "default_limit_plus")]
    pub limit_plus: f64,
    /// Soft-limit minimum [mm].
    #[serde(default)]
    pub limit_minus: f64,
    /// Travel per hardware pulse [mm].
    #[serde(default = "default_pulse_length")]
    pub pulse_length: f64,
    /// Homing group ordinal; lower groups home first.
    #[serde(default)]
    pub origin_order: u8,
    #[serde(default)]
    pub origin_dir: OriginDirection,
    #[serde(default)]
    pub origin_sensor: OriginSensorMode,
    /// Wait for the drive's in-position signal after moves.
    #[serde(default)]
    pub in_position: bool,
}

fn default_max_speed() -> f64 {
    100.0
}
fn default_accel() -> f64 {
    1000.0
}
fn default_start_speed() -> f64 {
    10.0
}
fn default_homing_speed() -> f64 {
    20.0
}
fn default_limit_plus() -> f64 {
    100.0
}
fn default_pulse_length() -> f64 {
    0.01
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            motor: MotorFamily::None,
            max_speed: default_max_speed(),
            max_accel: default_accel(),
            max_decel: default_accel(),
            start_speed: default_start_speed(),
            offset_speed: default_homing_speed(),
            origin_speed: default_homing_speed(),
            origin_offset: 0.0,
            limit_plus: default_limit_plus(),
            limit_minus: 0.0,
            pulse_length: default_pulse_length(),
            origin_order: 0,
            origin_dir: OriginDirection::Ccw,
            origin_sensor: OriginSensorMode::Off,
            in_position: false,
        }
    }
}

impl AxisConfig {
    /// Axis with a motor fitted and the given soft-limit maximum.
    pub fn with_motor(motor: MotorFamily, limit_plus: f64, origin_order: u8) -> Self {
        Self {
            motor,
            limit_plus,
            origin_order,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.motor.is_configured()
    }

    /// Validate the configuration of axis `axis`.
    ///
    /// Unpopulated axes are not checked.
    pub fn validate(&self, axis: usize) -> Result<(), ConfigError> {
        if axis >= AXIS_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "axis index {axis} exceeds {AXIS_COUNT} axes"
            )));
        }
        if !self.is_configured() {
            return Ok(());
        }
        if !(self.pulse_length > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: pulse_length must be > 0, got {}",
                self.pulse_length
            )));
        }
        if !(self.max_speed > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: max_speed must be > 0, got {}",
                self.max_speed
            )));
        }
        if self.start_speed < 0.0 || self.start_speed > self.max_speed {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: start_speed {} outside [0, {}]",
                self.start_speed, self.max_speed
            )));
        }
        if self.origin_speed <= 0.0 || self.offset_speed <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: origin and offset speeds must be > 0"
            )));
        }
        if self.max_accel <= 0.0 || self.max_decel <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: acceleration and deceleration must be > 0"
            )));
        }
        if self.limit_minus > self.limit_plus {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: limit_minus {} > limit_plus {}",
                self.limit_minus, self.limit_plus
            )));
        }
        Ok(())
    }

    // ─── Unit conversion ────────────────────────────────────────────

    /// Coordinate in mm to controller pulses, truncated toward zero.
    ///
    /// Both operands are scaled by 100 before dividing so that values such
    /// as `0.3 / 0.01` land on the expected integer.
    #[inline]
    pub fn mm_to_pulse(&self, mm: f64) -> i32 {
        if self.pulse_length <= 0.0 {
            return 0;
        }
        trunc_tolerant((mm * 100.0) / (self.pulse_length * 100.0)) as i32
    }

    /// Controller pulses to mm, rounded to 0.01 mm.
    #[inline]
    pub fn pulse_to_mm(&self, pulses: i32) -> f64 {
        round2(pulses as f64 * self.pulse_length)
    }

    /// Speed in mm/s to pulse rate. A zero pulse length maps to 100 pps.
    #[inline]
    pub fn speed_to_pps(&self, speed_mm_s: f64) -> i32 {
        if self.pulse_length <= 0.0 {
            return 100;
        }
        trunc_tolerant(speed_mm_s / self.pulse_length) as i32
    }

    /// Speed as percent of `max_speed` (clamped to 1..=100) to pulse rate.
    #[inline]
    pub fn speed_percent_to_pps(&self, percent: f64) -> i32 {
        let percent = percent.clamp(1.0, 100.0);
        let speed = (self.max_speed * (percent / 100.0)).trunc();
        self.speed_to_pps(speed)
    }

    /// Soft limits in pulses `(minus, plus)`.
    #[inline]
    pub fn soft_limit_pulses(&self) -> (i32, i32) {
        (self.mm_to_pulse(self.limit_minus), self.mm_to_pulse(self.limit_plus))
    }

    /// Whether `position` lies within `[limit_minus, limit_plus]`.
    #[inline]
    pub fn within_soft_limits(&self, position: f64) -> bool {
        (self.limit_minus..=self.limit_plus).contains(&position)
    }
}

/// Round to two decimals.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Truncate toward zero, snapping values within 1e-6 of an integer.
#[inline]
fn trunc_tolerant(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < 1e-6 { nearest } else { v.trunc() }
}
