//! Live axis status.
//!
//! Refreshed from controller registers by the owning axis' homing, jog and
//! move paths; read by everyone else as a snapshot copy.

use serde::Serialize;

use super::AxisId;
use crate::hal::registers::{BitGroup, Rr0, Rr2, Rr3};

/// Snapshot of one axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AxisStatus {
    /// Absolute (logical) coordinate [mm].
    pub position: f64,
    /// Relative coordinate [mm].
    pub relative_position: f64,
    /// Drive pulse output active.
    pub busy: bool,
    /// Controller error latch for this axis.
    pub error: bool,
    pub alarm: bool,
    pub emergency: bool,
    /// Origin established since the last homing run.
    pub homed: bool,
    pub origin_sensor: bool,
    pub in_position: bool,
    /// Homing finished but not cleanly (alarm, emergency, missing sensor, timeout).
    pub homing_error: bool,
    /// Discrete inputs, bits 0..3.
    pub inputs: u8,
    /// Discrete outputs, bits 0..7.
    pub outputs: u8,
}

impl AxisStatus {
    /// Decode RR0/RR2/RR3 for `axis`.
    pub fn apply_registers(&mut self, axis: AxisId, rr0: u32, rr2: u32, rr3: u32) {
        let group = BitGroup::for_axis(axis);
        let rr0 = Rr0::from_bits_truncate(rr0);
        let rr2 = Rr2::from_bits_truncate(rr2);
        let rr3 = Rr3::from_bits_truncate(rr3 & 0xFFFF);

        self.busy = rr0.contains(group.drive_bit());
        self.error = rr0.contains(group.error_bit());
        self.alarm = rr2.contains(Rr2::ALM);
        self.emergency = rr2.contains(Rr2::EMG);
        self.origin_sensor = rr3.contains(Rr3::STOP1);
        self.in_position = rr3.contains(Rr3::INPOS);
    }

    /// Decode the general I/O word (outputs low byte, inputs bits 8..11).
    pub fn apply_general_io(&mut self, word: u16) {
        self.outputs = (word & 0xFF) as u8;
        self.inputs = ((word >> 8) & 0x0F) as u8;
    }

    /// Alarm or emergency present.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.alarm || self.emergency
    }

    #[inline]
    pub fn input(&self, bit: u8) -> bool {
        bit < 4 && self.inputs & (1 << bit) != 0
    }

    #[inline]
    pub fn output(&self, bit: u8) -> bool {
        bit < 8 && self.outputs & (1 << bit) != 0
    }
}
