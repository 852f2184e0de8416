//! Named I/O expander ports.
//!
//! Output ports are numbered from 100 in the wiring documentation; the
//! board bit is `port - 100`. Input ports are numbered by board bit.
//!
//! | Output        | Port | Bit |   | Input             | Bit |
//! |---------------|------|-----|---|-------------------|-----|
//! | DRIVER_SV     | 100  | 0   |   | DRIVER_UP         | 0   |
//! | SCREW_GUIDE   | 102  | 2   |   | DRIVER_DOWN       | 1   |
//! | SCREW_VACUUM  | 104  | 4   |   | SCREW_GUIDE_CLOSE | 2   |
//! | DS_TIMING     | 106  | 6   |   | SCREW_GUIDE_OPEN  | 3   |
//! | DS_RESET      | 107  | 7   |   | SCREW_DETECT      | 4   |
//! | DRIVER        | 109  | 9   |   | FEEDER_SCREW      | 5   |
//! | WORK_LOCK     | 110  | 10  |   | DS_HIGH / OK / LOW| 6-8 |
//! | EMG_LED       | 112  | 12  |   | DRIVER_TORQUE_UP  | 9   |
//! | START_LEFT    | 113  | 13  |   | WORK_LOCK_ORG/LOCK| 10-11 |
//! | START_RIGHT   | 114  | 14  |   | WORK_ENABLE       | 12  |
//! | BUZZER        | 115  | 15  |   | START_LEFT/RIGHT  | 13-14 |
//! |               |      |     |   | EMG_SW            | 15  |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numbering offset of output ports.
pub const OUTPUT_PORT_BASE: u16 = 100;

/// Direction of a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoDirection {
    Input,
    Output,
}

/// A port name resolved to a board bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IoPort {
    pub board: u8,
    pub bit: u8,
    pub direction: IoDirection,
}

/// Parse error for port names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPort(pub String);

impl fmt::Display for UnknownPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown I/O port '{}'", self.0)
    }
}

impl std::error::Error for UnknownPort {}

macro_rules! port_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $value:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $num:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $num ),+
        }

        impl $name {
            /// Every port in numbering order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Port number.
            #[inline]
            pub const fn number(self) -> $value {
                self as $value
            }

            /// Wiring label.
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Port with the given number.
            pub fn from_number(n: $value) -> Option<Self> {
                Self::ALL.iter().copied().find(|p| p.number() == n)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = UnknownPort;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_uppercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|p| p.label() == wanted)
                    .ok_or_else(|| UnknownPort(s.to_string()))
            }
        }
    };
}

port_enum! {
    /// Actuator outputs.
    OutputPort, u16 {
        /// Driver solenoid valve.
        DriverSv = 100 => "DRIVER_SV",
        ScrewGuide = 102 => "SCREW_GUIDE",
        ScrewVacuum = 104 => "SCREW_VACUUM",
        /// Displacement sensor timing.
        DsTiming = 106 => "DS_TIMING",
        /// Displacement sensor reset.
        DsReset = 107 => "DS_RESET",
        Driver = 109 => "DRIVER",
        WorkLock = 110 => "WORK_LOCK",
        EmgLed = 112 => "EMG_LED",
        StartLeft = 113 => "START_LEFT",
        StartRight = 114 => "START_RIGHT",
        Buzzer = 115 => "BUZZER",
    }
}

port_enum! {
    /// Sensor inputs.
    InputPort, u16 {
        DriverUp = 0 => "DRIVER_UP",
        DriverDown = 1 => "DRIVER_DOWN",
        ScrewGuideClose = 2 => "SCREW_GUIDE_CLOSE",
        ScrewGuideOpen = 3 => "SCREW_GUIDE_OPEN",
        ScrewDetect = 4 => "SCREW_DETECT",
        FeederScrew = 5 => "FEEDER_SCREW",
        DsHigh = 6 => "DS_HIGH",
        DsOk = 7 => "DS_OK",
        DsLow = 8 => "DS_LOW",
        DriverTorqueUp = 9 => "DRIVER_TORQUE_UP",
        WorkLockOrg = 10 => "WORK_LOCK_ORG",
        WorkLockLock = 11 => "WORK_LOCK_LOCK",
        WorkEnable = 12 => "WORK_ENABLE",
        StartLeftSw = 13 => "START_LEFT_SW",
        StartRightSw = 14 => "START_RIGHT_SW",
        /// Emergency stop switch.
        EmgSw = 15 => "EMG_SW",
    }
}

impl OutputPort {
    /// Board bit of this output.
    #[inline]
    pub const fn bit(self) -> u8 {
        (self.number() - OUTPUT_PORT_BASE) as u8
    }

    #[inline]
    pub const fn bind(self, board: u8) -> IoPort {
        IoPort {
            board,
            bit: self.bit(),
            direction: IoDirection::Output,
        }
    }
}

impl InputPort {
    /// Board bit of this input.
    #[inline]
    pub const fn bit(self) -> u8 {
        self.number() as u8
    }

    #[inline]
    pub const fn bind(self, board: u8) -> IoPort {
        IoPort {
            board,
            bit: self.bit(),
            direction: IoDirection::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_bits_are_offset_from_100() {
        assert_eq!(OutputPort::DriverSv.bit(), 0);
        assert_eq!(OutputPort::Buzzer.bit(), 15);
        assert_eq!(OutputPort::DsReset.bind(0).bit, 7);
        assert_eq!(OutputPort::ALL.len(), 11);
    }

    #[test]
    fn input_bits_match_numbers() {
        assert_eq!(InputPort::EmgSw.bit(), 15);
        assert_eq!(InputPort::ALL.len(), 16);
        assert_eq!(InputPort::from_number(7), Some(InputPort::DsOk));
        assert_eq!(InputPort::from_number(16), None);
    }

    #[test]
    fn names_parse_and_display() {
        assert_eq!("buzzer".parse::<OutputPort>().unwrap(), OutputPort::Buzzer);
        assert_eq!("EMG_SW".parse::<InputPort>().unwrap(), InputPort::EmgSw);
        assert!("LASER".parse::<OutputPort>().is_err());
        assert_eq!(InputPort::WorkLockOrg.to_string(), "WORK_LOCK_ORG");
    }
}
