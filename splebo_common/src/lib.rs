//! SPLEBO Common Library
//!
//! Shared constants, configuration loading, axis parameters and error types
//! for all SPLEBO workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the robot configuration file
//! - [`consts`] - Axis count, board limits and timing defaults
//! - [`error`] - Robot error taxonomy surfaced to callers
//! - [`axis`] - Axis configuration, parameter store codec and live status
//! - [`hal`] - Device traits at the hardware boundary and the controller register map
//! - [`io`] - Named I/O expander ports
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! splebo_common = { workspace = true }
//! ```
//!
//! ```rust
//! use splebo_common::prelude::*;
//! ```

pub mod axis;
pub mod config;
pub mod consts;
pub mod error;
pub mod hal;
pub mod io;
pub mod prelude;
