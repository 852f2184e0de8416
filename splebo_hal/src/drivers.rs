//! Driver implementations.
//!
//! - [`simulation`] - Motion controller and CAN chip simulators for
//!   development and tests without hardware
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `MotionDevice` (or `SpiBus`) from `splebo_common::hal::driver`
//! 3. Register motion drivers in `register_all_drivers()`

pub mod simulation;

use crate::driver_registry::MotionDeviceRegistry;

/// Register all built-in motion drivers.
pub fn register_all_drivers(registry: &mut MotionDeviceRegistry) {
    registry.register("simulation", simulation::create_driver);
}
