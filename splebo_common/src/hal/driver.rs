//! Device traits and error types at the hardware boundary.
//!
//! This module defines:
//! - `MotionDevice` trait - the vendor motion controller's fixed operation set
//! - `SpiBus` trait - full-duplex transfers to the CAN controller chip
//! - `HalError` enum - error types for device operations
//! - `MotionDeviceFactory` type alias - factory function type
//!
//! # Ownership
//!
//! A `MotionDevice` is moved into the command bridge's dedicated thread at
//! connect time and is never touched from anywhere else. A `SpiBus` is owned
//! by the CAN bus driver behind a single lock. Neither trait requires `Sync`.

use crate::axis::AxisId;
use thiserror::Error;

/// Error types for device operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HalError {
    /// Device initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// The device refused the operation
    #[error("Device rejected operation: {0}")]
    DeviceRejected(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Axis id outside the controller's range
    #[error("Invalid axis: {0}")]
    InvalidAxis(AxisId),

    /// CAN board id outside 0..16
    #[error("Invalid CAN board: {0}")]
    InvalidBoard(u8),

    /// Bit index outside a board buffer
    #[error("Invalid bit index: {0}")]
    InvalidBit(u8),

    /// Device did not answer in time
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Factory function type for creating motion devices.
pub type MotionDeviceFactory = fn() -> Box<dyn MotionDevice>;

/// The vendor motion controller.
///
/// Every method maps one-to-one onto an operation of the controller's
/// native library. Coordinates and speeds are in hardware pulses.
/// Implementations are stateful and must not be called concurrently, which
/// is why only the command bridge consumer ever holds one.
pub trait MotionDevice: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Open the controller board.
    fn open(&mut self) -> Result<(), HalError>;

    /// Release the controller board.
    fn close(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    /// Write mode registers WR1..WR3.
    fn set_mode(&mut self, axis: AxisId, wr1: u16, wr2: u16, wr3: u16) -> Result<(), HalError>;

    fn set_drive_speed(&mut self, axis: AxisId, speed: i32) -> Result<(), HalError>;

    fn set_initial_velocity(&mut self, axis: AxisId, velocity: i32) -> Result<(), HalError>;

    fn set_acceleration(&mut self, axis: AxisId, accel: i32) -> Result<(), HalError>;

    fn set_deceleration(&mut self, axis: AxisId, decel: i32) -> Result<(), HalError>;

    /// Configure the controller-driven origin search (H1M/H2M).
    fn set_origin_mode(&mut self, axis: AxisId, h1m: u16, h2m: u16) -> Result<(), HalError>;

    /// Configure I/O signal modes (P1M/P2M).
    fn set_io_signal(&mut self, axis: AxisId, p1m: u16, p2m: u16) -> Result<(), HalError>;

    fn set_input_filter(&mut self, axis: AxisId, filter: u16) -> Result<(), HalError>;

    /// Start the controller-driven origin search.
    fn auto_origin(&mut self, axis: AxisId, search_speed: i32, drive_speed: i32)
    -> Result<(), HalError>;

    /// Set soft limits in pulses. `0, 0` disables them.
    fn set_soft_limit(&mut self, axis: AxisId, minus: i32, plus: i32) -> Result<(), HalError>;

    fn move_relative(&mut self, axis: AxisId, pulses: i32, speed: i32) -> Result<(), HalError>;

    fn move_absolute(&mut self, axis: AxisId, pulses: i32, speed: i32) -> Result<(), HalError>;

    /// Continuous motion; `ccw` selects the negative direction.
    fn move_jog(&mut self, axis: AxisId, speed: i32, ccw: bool) -> Result<(), HalError>;

    /// Immediate stop.
    fn stop(&mut self, axis: AxisId) -> Result<(), HalError>;

    fn decel_stop(&mut self, axis: AxisId) -> Result<(), HalError>;

    fn logical_coord(&mut self, axis: AxisId) -> Result<i32, HalError>;

    fn relative_coord(&mut self, axis: AxisId) -> Result<i32, HalError>;

    fn set_logical_coord(&mut self, axis: AxisId, pulses: i32) -> Result<(), HalError>;

    fn set_relative_coord(&mut self, axis: AxisId, pulses: i32) -> Result<(), HalError>;

    /// General I/O word: bits 0..7 outputs, bits 8..11 inputs.
    fn general_io(&mut self, axis: AxisId) -> Result<u16, HalError>;

    fn set_general_output(&mut self, axis: AxisId, value: u8) -> Result<(), HalError>;

    fn set_general_output_bit(&mut self, axis: AxisId, bit: u8, on: bool) -> Result<(), HalError>;

    /// Read a status register (RR2 / RR3).
    fn axis_status(&mut self, axis: AxisId, register: u8) -> Result<u32, HalError>;

    fn write_register(&mut self, axis: AxisId, register: u8, value: u32) -> Result<(), HalError>;

    fn read_register(&mut self, axis: AxisId, register: u8) -> Result<u32, HalError>;
}

/// Full-duplex SPI transfer to the CAN controller chip.
///
/// Chip select is asserted for the whole transfer. `buf` is sent and
/// overwritten in place with the bytes clocked back.
pub trait SpiBus: Send {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError>;
}

impl<T: SpiBus + ?Sized> SpiBus for Box<T> {
    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError> {
        (**self).transfer(buf)
    }
}
