//! Registry of motion controller drivers.
//!
//! Constructed at startup, populated via `register()`, and handed to the
//! robot session, which picks the driver named in `[motion] driver`.

use splebo_common::hal::driver::{HalError, MotionDevice, MotionDeviceFactory};
use std::collections::HashMap;

/// Registry of available motion device drivers.
pub struct MotionDeviceRegistry {
    factories: HashMap<&'static str, MotionDeviceFactory>,
}

impl MotionDeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every driver built into this crate.
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: MotionDeviceFactory) {
        if self.factories.contains_key(name) {
            panic!("Motion driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<MotionDeviceFactory> {
        self.factories.get(name).copied()
    }

    /// Create a device instance by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn create_device(&self, name: &str) -> Result<Box<dyn MotionDevice>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MotionDeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
