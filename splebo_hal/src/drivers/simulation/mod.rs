//! Simulation drivers.
//!
//! Software stand-ins for the two hardware channels: the vendor motion
//! controller and the SPI-attached MCP2515 with its I/O boards. Both hand
//! out a cloneable handle so tests can observe and disturb the simulated
//! hardware after the device itself has been moved into its owner.

mod can;
mod motion;

pub use can::{SimulatedCanChip, SimulatedCanNetwork};
pub use motion::{SimAxisSetup, SimulatedMotionController, SimulationHandle};

use splebo_common::hal::driver::MotionDevice;

/// Factory function to create a simulated motion controller.
pub fn create_driver() -> Box<dyn MotionDevice> {
    Box::new(SimulatedMotionController::new())
}
