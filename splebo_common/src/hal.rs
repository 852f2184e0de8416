//! Hardware boundary.
//!
//! Traits implemented by the device drivers in `splebo_hal` and the
//! register map of the motion controller chip.

pub mod driver;
pub mod registers;
