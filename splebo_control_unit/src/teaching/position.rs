//! Teaching point record.

use serde::{Deserialize, Serialize};
use splebo_common::axis::AxisId;
use splebo_common::consts::AXIS_COUNT;
use splebo_common::error::{RobotError, RobotResult};

/// A named pose: one coordinate per axis slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub point_no: u32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub u: f64,
    #[serde(default)]
    pub s1: f64,
    #[serde(default)]
    pub s2: f64,
    #[serde(default)]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default = "default_absolute")]
    pub is_absolute: bool,
    /// Protected points refuse update and delete.
    #[serde(default)]
    pub is_protected: bool,
    #[serde(default)]
    pub comment: String,
}

fn default_absolute() -> bool {
    true
}

impl Position {
    /// Absolute point at the origin.
    pub fn new(point_no: u32) -> Self {
        Self {
            point_no,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            u: 0.0,
            s1: 0.0,
            s2: 0.0,
            a: 0.0,
            b: 0.0,
            is_absolute: true,
            is_protected: false,
            comment: String::new(),
        }
    }

    /// Absolute point from the first `coords.len()` axes; the rest stay 0.
    pub fn from_coords(point_no: u32, coords: &[f64], comment: impl Into<String>) -> Self {
        let mut pos = Self::new(point_no);
        for (axis, &value) in coords.iter().take(AXIS_COUNT).enumerate() {
            pos.set_axis(axis as AxisId, value);
        }
        pos.comment = comment.into();
        pos
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Coordinate of an axis slot; 0 outside the controller range.
    pub fn axis(&self, axis: AxisId) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            2 => self.z,
            3 => self.u,
            4 => self.s1,
            5 => self.s2,
            6 => self.a,
            7 => self.b,
            _ => 0.0,
        }
    }

    /// Set an axis coordinate. Ids outside the controller range are ignored.
    pub fn set_axis(&mut self, axis: AxisId, value: f64) {
        let slot = match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.u,
            4 => &mut self.s1,
            5 => &mut self.s2,
            6 => &mut self.a,
            7 => &mut self.b,
            _ => return,
        };
        *slot = value;
    }

    pub fn coords(&self) -> [f64; AXIS_COUNT] {
        std::array::from_fn(|i| self.axis(i as AxisId))
    }

    /// Comments are single-line: the legacy store keeps one point per line.
    pub fn validate(&self) -> RobotResult<()> {
        if self.comment.contains(['\n', '\r']) {
            return Err(RobotError::validation(format!(
                "point {}: comment must not contain line breaks",
                self.point_no
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_slots_map_by_id() {
        let mut pos = Position::from_coords(3, &[1.0, 2.0, 3.0], "p3");
        assert_eq!(pos.coords(), [1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        pos.set_axis(7, 9.5);
        pos.set_axis(8, 1.0);
        assert_eq!(pos.b, 9.5);
        assert_eq!(pos.axis(8), 0.0);
        assert!(pos.is_absolute);
        assert_eq!(pos.comment, "p3");
    }

    #[test]
    fn multi_line_comment_is_invalid() {
        assert!(Position::new(1).with_comment("pick, left").validate().is_ok());
        assert!(Position::new(1).with_comment("a\nItem9=77").validate().is_err());
        assert!(Position::new(1).with_comment("a\rb").validate().is_err());
    }

    #[test]
    fn missing_json_fields_default() {
        let pos: Position = serde_json::from_str(r#"{"point_no": 4, "x": 1.5}"#).unwrap();
        assert_eq!(pos.point_no, 4);
        assert_eq!(pos.x, 1.5);
        assert!(pos.is_absolute);
        assert!(!pos.is_protected);
        assert!(pos.comment.is_empty());
    }
}
