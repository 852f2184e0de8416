//! Configuration loading traits and types.
//!
//! A single TOML file configures the robot core. Every section has serde
//! defaults so a minimal file only needs `[shared]`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use splebo_common::config::{ConfigLoader, RobotConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RobotConfig::load(Path::new("robot.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "splebo-n-01"
//!
//! [motion]
//! driver = "simulation"
//! bridge_capacity = 64
//!
//! [jog]
//! speed_min_mm_s = 1.0
//! speed_max_mm_s = 100.0
//!
//! [storage]
//! axis_params = "/etc/splebo/axis.toml"
//! positions = "/var/lib/splebo/positions.json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::consts::{
    BRIDGE_IDLE_INTERVAL, CAN_INTER_BOARD_DELAY, CAN_POLL_INTERVAL, HOMING_TICK, MAX_CAN_BOARDS,
    SERVICE_NAME,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML or store parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Motion ─────────────────────────────────────────────────────────

/// Command bridge and motion timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Registered motion device driver name.
    #[serde(default = "default_motion_driver")]
    pub driver: String,
    /// Ring slots; must exceed the commands in flight at any time.
    #[serde(default = "default_bridge_capacity")]
    pub bridge_capacity: usize,
    /// Consumer wait between rescans [ms].
    #[serde(default = "default_bridge_idle_ms")]
    pub bridge_idle_ms: u64,
    /// Upper bound for a single bridged command round trip [ms].
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Wait for motion completion in `move_to_point` [ms].
    #[serde(default = "default_motion_timeout_ms")]
    pub motion_timeout_ms: u64,
    /// Homing scheduler tick [ms].
    #[serde(default = "default_homing_tick_ms")]
    pub homing_tick_ms: u64,
    /// Per-axis homing timeout [ms].
    #[serde(default = "default_homing_timeout_ms")]
    pub homing_timeout_ms: u64,
    /// Fault-clear output pulse width in `reset_alarm` [ms].
    #[serde(default = "default_clear_pulse_ms")]
    pub clear_pulse_ms: u64,
    /// Settle time between points of a point sequence [ms].
    #[serde(default = "default_sequence_step_delay_ms")]
    pub sequence_step_delay_ms: u64,
}

fn default_motion_driver() -> String {
    "simulation".to_string()
}
fn default_bridge_capacity() -> usize {
    crate::consts::DEFAULT_BRIDGE_CAPACITY
}
fn default_bridge_idle_ms() -> u64 {
    BRIDGE_IDLE_INTERVAL.as_millis() as u64
}
fn default_command_timeout_ms() -> u64 {
    2_000
}
fn default_motion_timeout_ms() -> u64 {
    30_000
}
fn default_homing_tick_ms() -> u64 {
    HOMING_TICK.as_millis() as u64
}
fn default_homing_timeout_ms() -> u64 {
    60_000
}
fn default_clear_pulse_ms() -> u64 {
    1_000
}
fn default_sequence_step_delay_ms() -> u64 {
    100
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            driver: default_motion_driver(),
            bridge_capacity: default_bridge_capacity(),
            bridge_idle_ms: default_bridge_idle_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            motion_timeout_ms: default_motion_timeout_ms(),
            homing_tick_ms: default_homing_tick_ms(),
            homing_timeout_ms: default_homing_timeout_ms(),
            clear_pulse_ms: default_clear_pulse_ms(),
            sequence_step_delay_ms: default_sequence_step_delay_ms(),
        }
    }
}

impl MotionConfig {
    /// Validate bridge sizing and timeouts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "motion.driver cannot be empty".to_string(),
            ));
        }
        if self.bridge_capacity < 2 {
            return Err(ConfigError::ValidationError(format!(
                "motion.bridge_capacity must be >= 2, got {}",
                self.bridge_capacity
            )));
        }
        if self.homing_tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "motion.homing_tick_ms must be > 0".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 || self.motion_timeout_ms == 0 || self.homing_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "motion timeouts must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn bridge_idle(&self) -> Duration {
        Duration::from_millis(self.bridge_idle_ms)
    }

    #[inline]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    #[inline]
    pub fn motion_timeout(&self) -> Duration {
        Duration::from_millis(self.motion_timeout_ms)
    }

    #[inline]
    pub fn homing_tick(&self) -> Duration {
        Duration::from_millis(self.homing_tick_ms)
    }

    #[inline]
    pub fn homing_timeout(&self) -> Duration {
        Duration::from_millis(self.homing_timeout_ms)
    }

    #[inline]
    pub fn clear_pulse(&self) -> Duration {
        Duration::from_millis(self.clear_pulse_ms)
    }

    #[inline]
    pub fn sequence_step_delay(&self) -> Duration {
        Duration::from_millis(self.sequence_step_delay_ms)
    }
}

// ─── Jog ────────────────────────────────────────────────────────────

/// Jog speed window and soft-limit monitor interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JogConfig {
    #[serde(default = "default_jog_speed_min")]
    pub speed_min_mm_s: f64,
    #[serde(default = "default_jog_speed_max")]
    pub speed_max_mm_s: f64,
    #[serde(default = "default_jog_speed_default")]
    pub speed_default_mm_s: f64,
    /// Soft-limit monitor poll [ms].
    #[serde(default = "default_jog_poll_ms")]
    pub poll_interval_ms: u64,
}

fn default_jog_speed_min() -> f64 {
    1.0
}
fn default_jog_speed_max() -> f64 {
    100.0
}
fn default_jog_speed_default() -> f64 {
    10.0
}
fn default_jog_poll_ms() -> u64 {
    50
}

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            speed_min_mm_s: default_jog_speed_min(),
            speed_max_mm_s: default_jog_speed_max(),
            speed_default_mm_s: default_jog_speed_default(),
            poll_interval_ms: default_jog_poll_ms(),
        }
    }
}

impl JogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speed_min_mm_s <= 0.0 || self.speed_min_mm_s > self.speed_max_mm_s {
            return Err(ConfigError::ValidationError(format!(
                "jog speed window invalid: [{}, {}]",
                self.speed_min_mm_s, self.speed_max_mm_s
            )));
        }
        if !(self.speed_min_mm_s..=self.speed_max_mm_s).contains(&self.speed_default_mm_s) {
            return Err(ConfigError::ValidationError(format!(
                "jog.speed_default_mm_s {} outside [{}, {}]",
                self.speed_default_mm_s, self.speed_min_mm_s, self.speed_max_mm_s
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "jog.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ─── CAN ────────────────────────────────────────────────────────────

/// CAN bus polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanConfig {
    /// Interval between full poll cycles [ms].
    #[serde(default = "default_can_poll_ms")]
    pub poll_interval_ms: u64,
    /// Delay between two boards in one cycle [ms].
    #[serde(default = "default_can_board_delay_ms")]
    pub inter_board_delay_ms: u64,
    /// SPI clock [Hz].
    #[serde(default = "default_spi_speed_hz")]
    pub spi_speed_hz: u32,
    /// Boards polled at startup.
    #[serde(default = "default_can_boards")]
    pub boards: Vec<u8>,
    /// Consecutive unanswered polls before a board is marked invalid.
    /// 0 keeps silent boards in the cycle; only transfer errors invalidate.
    #[serde(default)]
    pub miss_limit: u32,
}

fn default_can_poll_ms() -> u64 {
    CAN_POLL_INTERVAL.as_millis() as u64
}
fn default_can_board_delay_ms() -> u64 {
    CAN_INTER_BOARD_DELAY.as_millis() as u64
}
fn default_spi_speed_hz() -> u32 {
    500_000
}
fn default_can_boards() -> Vec<u8> {
    vec![0]
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_can_poll_ms(),
            inter_board_delay_ms: default_can_board_delay_ms(),
            spi_speed_hz: default_spi_speed_hz(),
            boards: default_can_boards(),
            miss_limit: 0,
        }
    }
}

impl CanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = self.boards.iter().find(|&&id| id as usize >= MAX_CAN_BOARDS) {
            return Err(ConfigError::ValidationError(format!(
                "can.boards contains id {id}, max is {}",
                MAX_CAN_BOARDS - 1
            )));
        }
        if self.spi_speed_hz == 0 {
            return Err(ConfigError::ValidationError(
                "can.spi_speed_hz must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    pub fn inter_board_delay(&self) -> Duration {
        Duration::from_millis(self.inter_board_delay_ms)
    }
}

// ─── I/O expander ───────────────────────────────────────────────────

/// I/O expander board binding and wait behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    #[serde(default)]
    pub board_id: u8,
    /// `wait_input` poll [ms].
    #[serde(default = "default_io_wait_poll_ms")]
    pub wait_poll_ms: u64,
    /// `wait_input` default timeout [ms].
    #[serde(default = "default_io_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Emergency-switch watch interval [ms].
    #[serde(default = "default_io_emergency_poll_ms")]
    pub emergency_poll_ms: u64,
}

fn default_io_wait_poll_ms() -> u64 {
    5
}
fn default_io_wait_timeout_ms() -> u64 {
    500
}
fn default_io_emergency_poll_ms() -> u64 {
    50
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            board_id: 0,
            wait_poll_ms: default_io_wait_poll_ms(),
            wait_timeout_ms: default_io_wait_timeout_ms(),
            emergency_poll_ms: default_io_emergency_poll_ms(),
        }
    }
}

impl IoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_id as usize >= MAX_CAN_BOARDS {
            return Err(ConfigError::ValidationError(format!(
                "io.board_id {} out of range",
                self.board_id
            )));
        }
        if self.wait_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "io.wait_poll_ms must be > 0".to_string(),
            ));
        }
        if self.emergency_poll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "io.emergency_poll_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }

    #[inline]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    #[inline]
    pub fn emergency_poll(&self) -> Duration {
        Duration::from_millis(self.emergency_poll_ms)
    }
}

// ─── Storage ────────────────────────────────────────────────────────

/// On-disk layout of the teaching-point store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PositionFormat {
    #[default]
    Json,
    /// Line-oriented `.pos` format.
    Legacy,
}

/// Locations of the persisted stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Axis-parameter store (`.toml` or legacy `.sys`). Missing means defaults.
    #[serde(default)]
    pub axis_params: Option<PathBuf>,
    /// Teaching-point store.
    #[serde(default = "default_positions_path")]
    pub positions: PathBuf,
    #[serde(default)]
    pub position_format: PositionFormat,
}

fn default_positions_path() -> PathBuf {
    PathBuf::from("positions.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            axis_params: None,
            positions: default_positions_path(),
            position_format: PositionFormat::default(),
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete robot configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub jog: JogConfig,
    #[serde(default)]
    pub can: CanConfig,
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl RobotConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.motion.validate()?;
        self.jog.validate()?;
        self.can.validate()?;
        self.io.validate()?;
        Ok(())
    }

    /// Resolve relative store paths against the directory of the config file.
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = self.storage.axis_params.take() {
            self.storage.axis_params = Some(resolve_path(base, &path));
        }
        self.storage.positions = resolve_path(base, &self.storage.positions);
    }
}

fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}

/// Resolve a possibly relative path against a base directory.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Trait for loading configuration from TOML files.
///
/// A blanket implementation covers every `DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"").unwrap().level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"").unwrap().level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RobotConfig::from_toml("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.motion.driver, "simulation");
        assert_eq!(config.motion.bridge_capacity, 64);
        assert_eq!(config.jog.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.io.wait_timeout_ms, 500);
        assert_eq!(config.can.boards, vec![0]);
        assert_eq!(config.storage.position_format, PositionFormat::Json);
    }

    #[test]
    fn test_jog_window_validation() {
        let mut jog = JogConfig::default();
        jog.speed_min_mm_s = 50.0;
        jog.speed_max_mm_s = 10.0;
        assert!(jog.validate().is_err());

        let mut jog = JogConfig::default();
        jog.speed_default_mm_s = 500.0;
        assert!(jog.validate().is_err());
    }

    #[test]
    fn test_can_board_out_of_range() {
        let mut can = CanConfig::default();
        can.boards = vec![0, 16];
        assert!(matches!(can.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_bridge_capacity_too_small() {
        let mut motion = MotionConfig::default();
        motion.bridge_capacity = 1;
        assert!(motion.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = RobotConfig::load(Path::new("/nonexistent/path/robot.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = RobotConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "splebo-test"

[jog]
speed_max_mm_s = 50.0

[storage]
positions = "teach/points.pos"
position_format = "legacy"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let mut config = RobotConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.jog.speed_max_mm_s, 50.0);
        assert_eq!(config.storage.position_format, PositionFormat::Legacy);

        config.resolve_paths(Path::new("/opt/splebo"));
        assert_eq!(
            config.storage.positions,
            PathBuf::from("/opt/splebo/teach/points.pos")
        );
    }
}
