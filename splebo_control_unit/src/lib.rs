//! # SPLEBO Control Unit Library
//!
//! Motion and I/O core of the SPLEBO screw-fastening robot. Every access to
//! the vendor motion controller funnels through one dedicated thread; the
//! CAN bus is a second, independently owned channel.
//!
//! ```text
//!                       RobotSession (coarse lock)
//!        ┌──────────────┬──────────┼───────────┬──────────────┐
//!   HomingScheduler  JogController │     PositionTable   IoExpander
//!        └──────┬───────┘          │                         │
//!          AxisController ─────────┘                       CanBus
//!               │                                            │
//!         CommandBridge ──► motion-bridge thread ──► MotionDevice
//!                                                  can-poll thread ──► MCP2515
//! ```
//!
//! ## Modules
//!
//! | Module        | Role                                                   |
//! |---------------|--------------------------------------------------------|
//! | `bridge`      | Ring-buffer request/response into the motion thread    |
//! | `command`     | One variant per motion controller operation            |
//! | `motor`       | Motor-family capability trait (ActuatorA, stepping...) |
//! | `axis`        | Axis initialization, status table, moves, waits        |
//! | `safety`      | Latched safety fault                                   |
//! | `homing`      | Grouped origin-return state machine                    |
//! | `jog`         | Jog sessions with soft-limit monitors                  |
//! | `io_expander` | Named sensor and actuator ports over CAN               |
//! | `teaching`    | Teaching-point table and its two store codecs          |
//! | `sequence`    | Ordered point moves with pause and stop                |
//! | `session`     | Composition root consumed by the service layer         |

pub mod axis;
pub mod bridge;
pub mod command;
pub mod homing;
pub mod io_expander;
pub mod jog;
pub mod motor;
pub mod safety;
pub mod sequence;
pub mod session;
pub mod teaching;

pub use crate::bridge::{CommandBridge, CommandHandle};
pub use crate::command::{CommandReply, MotionCommand};
pub use crate::session::RobotSession;
