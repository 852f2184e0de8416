//! # SPLEBO HAL Library
//!
//! Hardware boundary of the robot: the register-level CAN driver for the
//! I/O expansion boards and the pluggable motion controller drivers.
//!
//! # Module Structure
//!
//! - [`can`] - MCP2515 protocol, frame layout and the 16-board poller
//! - [`driver_registry`] - Motion device factory registration
//! - [`drivers`] - Motion device and SPI implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         splebo_hal                               │
//! │                                                                  │
//! │  ┌────────────────┐       ┌─────────────┐      ┌──────────────┐  │
//! │  │ CanBus         │──────►│ Mcp2515     │─────►│ SpiBus       │  │
//! │  │ (poll thread)  │ lock  │ (registers) │      │ (trait obj)  │  │
//! │  └────────────────┘       └─────────────┘      └──────────────┘  │
//! │                                                                  │
//! │  ┌────────────────┐       ┌──────────────────────────────────┐   │
//! │  │ MotionDevice   │──────►│ MotionDevice (trait object)      │   │
//! │  │ Registry       │       │ owned by the command bridge      │   │
//! │  └────────────────┘       └──────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod can;
pub mod driver_registry;
pub mod drivers;

pub use crate::can::{CanBus, CanFrame, CanPoller, Mcp2515};
pub use crate::driver_registry::MotionDeviceRegistry;
