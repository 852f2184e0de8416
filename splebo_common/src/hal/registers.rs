//! Motion controller register map.
//!
//! The controller exposes one set of read registers (RR0..RR5) shared by
//! four axis bit groups. Axes beyond the fourth alias onto the same groups:
//!
//! | Axis id | Name | Bit group |
//! |---------|------|-----------|
//! | 0, 4    | X, S1 | X |
//! | 1, 5    | Y, S2 | Y |
//! | 2, 6    | Z, A  | Z |
//! | 3, 7    | U, B  | U |

use bitflags::bitflags;

/// Write register 0 (command register).
pub const WR0: u8 = 0x00;
/// Read register 0 (drive / error status).
pub const RR0: u8 = 0x00;
/// Read register 1.
pub const RR1: u8 = 0x01;
/// Read register 2 (alarm / emergency).
pub const RR2: u8 = 0x02;
/// Read register 3 (stop inputs / in-position).
pub const RR3: u8 = 0x03;

/// WR2 value written on axis initialization.
pub const MODE_WR2: u16 = 0xA384;
/// Mask applied to WR2 when the in-position signal is unused.
pub const MODE_WR2_NO_INPOS_MASK: u16 = 0xFF7F;
/// WR3 value for ActuatorA axes.
pub const MODE_WR3_ACTUATOR_A: u16 = 0x0B40;
/// WR3 value for stepping and ActuatorB axes.
pub const MODE_WR3_STEPPING: u16 = 0x0F90;
/// I/O signal mode P1M.
pub const IO_SIGNAL_P1M: u16 = 0x4055;

/// Auto-origin mode H1M base (direction bit OR-ed in).
pub const ORIGIN_H1M: u16 = 0x315;
/// H1M bit selecting the negative search direction.
pub const ORIGIN_H1M_REVERSE: u16 = 0x02;
/// Auto-origin mode H2M.
pub const ORIGIN_H2M: u16 = 0x686;

/// Base of the WR0 error-clear command; the axis bit is `1 << (axis + 8)`.
pub const WR0_CLEAR_CMD: u32 = 0x79;

bitflags! {
    /// RR0: per bit group drive and error flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rr0: u32 {
        const XDRV = 0x01;
        const YDRV = 0x02;
        const ZDRV = 0x04;
        const UDRV = 0x08;
        const XERR = 0x10;
        const YERR = 0x20;
        const ZERR = 0x40;
        const UERR = 0x80;
    }
}

bitflags! {
    /// RR2: alarm and emergency inputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rr2: u32 {
        const ALM = 0x10;
        const EMG = 0x20;
    }
}

bitflags! {
    /// RR3: stop inputs and in-position.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rr3: u32 {
        const STOP0 = 0x01;
        const STOP1 = 0x02;
        const STOP2 = 0x04;
        const INPOS = 0x20;
    }
}

/// Register bit group an axis reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitGroup {
    X,
    Y,
    Z,
    U,
}

impl BitGroup {
    /// Group for an axis id.
    #[inline]
    pub const fn for_axis(axis: u8) -> Self {
        match axis {
            0 | 4 => Self::X,
            1 | 5 => Self::Y,
            2 | 6 => Self::Z,
            _ => Self::U,
        }
    }

    /// Drive (busy) bit of this group in RR0.
    #[inline]
    pub const fn drive_bit(self) -> Rr0 {
        match self {
            Self::X => Rr0::XDRV,
            Self::Y => Rr0::YDRV,
            Self::Z => Rr0::ZDRV,
            Self::U => Rr0::UDRV,
        }
    }

    /// Error bit of this group in RR0.
    #[inline]
    pub const fn error_bit(self) -> Rr0 {
        match self {
            Self::X => Rr0::XERR,
            Self::Y => Rr0::YERR,
            Self::Z => Rr0::ZERR,
            Self::U => Rr0::UERR,
        }
    }
}

/// Per-axis general purpose outputs wired to the drive.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOutput {
    /// Servo enable.
    Servo = 0,
    /// Fault clear.
    Clear = 1,
    /// Homing request.
    Homing = 2,
}

/// WR0 value that clears the error latch of `axis`.
#[inline]
pub const fn clear_command(axis: u8) -> u32 {
    WR0_CLEAR_CMD | 1 << (axis as u32 + 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliased_axes_share_groups() {
        assert_eq!(BitGroup::for_axis(0), BitGroup::X);
        assert_eq!(BitGroup::for_axis(4), BitGroup::X);
        assert_eq!(BitGroup::for_axis(5), BitGroup::Y);
        assert_eq!(BitGroup::for_axis(6), BitGroup::Z);
        assert_eq!(BitGroup::for_axis(3), BitGroup::U);
        assert_eq!(BitGroup::for_axis(7), BitGroup::U);
    }

    #[test]
    fn group_bits() {
        assert_eq!(BitGroup::Z.drive_bit().bits(), 0x04);
        assert_eq!(BitGroup::U.error_bit().bits(), 0x80);
    }

    #[test]
    fn clear_command_sets_axis_bit() {
        assert_eq!(clear_command(0), 0x179);
        assert_eq!(clear_command(2), 0x479);
    }
}
