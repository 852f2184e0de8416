//! Robot error taxonomy.
//!
//! Every operation exposed by the robot session returns [`RobotResult`].
//! Errors carry a [`ErrorKind`] plus a human readable message so callers
//! (HTTP layer, CLI) can map them without string matching.
//!
//! | Kind                     | Raised when                                           |
//! |--------------------------|-------------------------------------------------------|
//! | `Validation`             | bad axis id, speed out of range, already past limit   |
//! | `HardwareCommandFailure` | the motion controller rejected a bridged command      |
//! | `CommunicationTimeout`   | motion completion or CAN response did not arrive      |
//! | `SafetyFault`            | emergency stop or alarm, motion refused until reset   |
//! | `Configuration`          | parameter store malformed, bridge capacity exceeded   |
//! | `Persistence`            | teaching-point store could not be read or written     |

use crate::config::ConfigError;
use crate::hal::driver::HalError;
use serde::Serialize;
use thiserror::Error;

/// Result alias used across the robot core.
pub type RobotResult<T> = Result<T, RobotError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    HardwareCommandFailure,
    CommunicationTimeout,
    SafetyFault,
    Configuration,
    Persistence,
}

/// Error returned by robot operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RobotError {
    /// Rejected before any hardware access.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The controller reported failure for a submitted command.
    #[error("Hardware command {command} failed: {message}")]
    HardwareCommandFailure {
        /// Command name, e.g. `MoveJog`.
        command: String,
        /// Failure detail.
        message: String,
    },

    /// No response within the configured window.
    #[error("Communication timeout: {0}")]
    CommunicationTimeout(String),

    /// Emergency or alarm observed; requires an explicit reset.
    #[error("Safety fault: {0}")]
    SafetyFault(String),

    /// Configuration or parameter store invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Durable storage failure.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RobotError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::HardwareCommandFailure { .. } => ErrorKind::HardwareCommandFailure,
            Self::CommunicationTimeout(_) => ErrorKind::CommunicationTimeout,
            Self::SafetyFault(_) => ErrorKind::SafetyFault,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a hardware command failure.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareCommandFailure {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<HalError> for RobotError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::ConfigError(msg) | HalError::DriverNotFound(msg) => Self::Configuration(msg),
            HalError::InvalidAxis(axis) => Self::Validation(format!("invalid axis {axis}")),
            HalError::InvalidBoard(board) => Self::Validation(format!("invalid CAN board {board}")),
            HalError::InvalidBit(bit) => Self::Validation(format!("invalid bit index {bit}")),
            HalError::Timeout(msg) => Self::CommunicationTimeout(msg),
            other => Self::command_failed("hal", other.to_string()),
        }
    }
}

impl From<ConfigError> for RobotError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(RobotError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            RobotError::command_failed("Stop", "rejected").kind(),
            ErrorKind::HardwareCommandFailure
        );
        assert_eq!(
            RobotError::SafetyFault("emg".into()).kind(),
            ErrorKind::SafetyFault
        );
    }

    #[test]
    fn hal_errors_map_to_taxonomy() {
        let err: RobotError = HalError::InvalidAxis(9).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: RobotError = HalError::Timeout("rx".into()).into();
        assert_eq!(err.kind(), ErrorKind::CommunicationTimeout);

        let err: RobotError = HalError::CommunicationError("spi".into()).into();
        assert_eq!(err.kind(), ErrorKind::HardwareCommandFailure);

        let err: RobotError = HalError::DriverNotFound("ethercat".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn display_includes_command_name() {
        let err = RobotError::command_failed("MoveJog", "axis busy");
        assert_eq!(err.to_string(), "Hardware command MoveJog failed: axis busy");
    }

    #[test]
    fn config_error_becomes_configuration() {
        let err: RobotError = ConfigError::ValidationError("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
