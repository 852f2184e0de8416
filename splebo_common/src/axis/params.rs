//! Axis-parameter store.
//!
//! Holds one [`AxisConfig`] per controller axis slot. Two on-disk layouts
//! are supported and selected by file extension:
//!
//! - `*.sys`: the line-oriented project file written by the teaching pendant
//! - anything else: TOML with an `[[axes]]` array
//!
//! # Legacy layout
//!
//! ```text
//! [Project]
//! DataType=SPLEBO-N.SYS
//! Version=1.00
//! TimeStamp=2024/10/22 10:00:00
//!
//! [SysParam]
//! MaxSpeed=300,300,200,0,0,0,0,0
//! ...
//! MotorType=1,1,1,0,0,0,0,0
//! ```
//!
//! Each key holds comma-separated values, one per axis. A wrong `DataType`
//! or `Version`, a missing key or a malformed number fails the load.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

use super::config::{AxisConfig, MotorFamily, OriginDirection, OriginSensorMode};
use super::AxisId;
use crate::config::ConfigError;
use crate::consts::{AXIS_COUNT, STORE_TIMESTAMP_FORMAT, STORE_VERSION, SYS_DATA_TYPE};

const PROJECT_TAG: &str = "[Project]";
const SYS_PARAM_TAG: &str = "[SysParam]";

/// Keys of the `[SysParam]` section in file order.
const SYS_KEYS: [&str; 15] = [
    "MaxSpeed",
    "MaxAccel",
    "MaxDecel",
    "StartSpeed",
    "OffsetSpeed",
    "OriginSpeed",
    "OriginOffset",
    "LimitPlus",
    "LimitMinus",
    "PulseLength",
    "OriginOrder",
    "OriginDir",
    "OriginSensor",
    "InPosition",
    "MotorType",
];

/// Configuration of every axis slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisParameterStore {
    axes: Vec<AxisConfig>,
}

impl Default for AxisParameterStore {
    /// Three-axis table robot: X and Y share group 2, Z homes first.
    fn default() -> Self {
        let mut axes = vec![AxisConfig::default(); AXIS_COUNT];
        axes[0] = AxisConfig::with_motor(MotorFamily::ActuatorA, 300.5, 2);
        axes[1] = AxisConfig::with_motor(MotorFamily::ActuatorA, 300.5, 2);
        axes[2] = AxisConfig::with_motor(MotorFamily::ActuatorA, 100.5, 1);
        Self { axes }
    }
}

impl AxisParameterStore {
    /// Build from explicit configs, padding unpopulated slots.
    pub fn new(mut axes: Vec<AxisConfig>) -> Result<Self, ConfigError> {
        if axes.len() > AXIS_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "{} axes configured, controller has {AXIS_COUNT}",
                axes.len()
            )));
        }
        axes.resize(AXIS_COUNT, AxisConfig::default());
        let store = Self { axes };
        store.validate()?;
        Ok(store)
    }

    /// Validate every axis.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.len() != AXIS_COUNT {
            return Err(ConfigError::ValidationError(format!(
                "expected {AXIS_COUNT} axis entries, found {}",
                self.axes.len()
            )));
        }
        for (idx, axis) in self.axes.iter().enumerate() {
            axis.validate(idx)?;
        }
        Ok(())
    }

    /// All axis slots, indexed by axis id.
    #[inline]
    pub fn axes(&self) -> &[AxisConfig] {
        &self.axes
    }

    #[inline]
    pub fn axis(&self, axis: AxisId) -> Option<&AxisConfig> {
        self.axes.get(axis as usize)
    }

    /// Ids of axes with a motor fitted.
    pub fn configured(&self) -> impl Iterator<Item = AxisId> + '_ {
        self.axes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_configured())
            .map(|(i, _)| i as AxisId)
    }

    // ─── Files ──────────────────────────────────────────────────────

    /// Load from `path`, choosing the codec by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;

        let store = if is_legacy(path) {
            Self::from_sys(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        info!(
            "Loaded axis parameters from {} ({} configured axes)",
            path.display(),
            store.configured().count()
        );
        Ok(store)
    }

    /// Rewrite `path` with the whole table.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = if is_legacy(path) {
            self.to_sys()
        } else {
            self.to_toml_string()?
        };
        std::fs::write(path, content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        debug!("Axis parameters written to {}", path.display());
        Ok(())
    }

    // ─── TOML codec ─────────────────────────────────────────────────

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::new(parsed.axes)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    // ─── Legacy codec ───────────────────────────────────────────────

    /// Parse the legacy project file.
    pub fn from_sys(content: &str) -> Result<Self, ConfigError> {
        let mut lines = content.lines().map(str::trim);

        if lines.next() != Some(PROJECT_TAG) {
            return Err(ConfigError::ParseError(format!(
                "missing {PROJECT_TAG} header"
            )));
        }
        let data_type = header_value(lines.next(), "DataType")?;
        if data_type != SYS_DATA_TYPE {
            return Err(ConfigError::ValidationError(format!(
                "wrong DataType: expected {SYS_DATA_TYPE}, found {data_type}"
            )));
        }
        let version = header_value(lines.next(), "Version")?;
        if !version.starts_with(STORE_VERSION) {
            return Err(ConfigError::ValidationError(format!(
                "wrong Version: expected {STORE_VERSION}, found {version}"
            )));
        }

        let mut in_section = false;
        let mut values: Vec<Option<Vec<&str>>> = vec![None; SYS_KEYS.len()];
        for line in lines {
            if line == SYS_PARAM_TAG {
                in_section = true;
                continue;
            }
            if !in_section || line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                break;
            }
            let Some((key, rest)) = line.split_once('=') else {
                continue;
            };
            if let Some(idx) = SYS_KEYS.iter().position(|k| *k == key.trim()) {
                values[idx] = Some(rest.split(',').map(str::trim).collect());
            }
        }
        if !in_section {
            return Err(ConfigError::ParseError(format!(
                "missing {SYS_PARAM_TAG} section"
            )));
        }

        let mut columns = Vec::with_capacity(SYS_KEYS.len());
        for (key, v) in SYS_KEYS.iter().zip(values) {
            let v = v.ok_or_else(|| ConfigError::ParseError(format!("missing key {key}")))?;
            if v.len() < AXIS_COUNT {
                return Err(ConfigError::ParseError(format!(
                    "{key} has {} values, expected {AXIS_COUNT}",
                    v.len()
                )));
            }
            let nums = v[..AXIS_COUNT]
                .iter()
                .map(|s| {
                    s.parse::<f64>()
                        .map_err(|_| ConfigError::ParseError(format!("{key}: invalid number '{s}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            columns.push(nums);
        }

        let axes = (0..AXIS_COUNT)
            .map(|i| {
                let col = |k: usize| columns[k][i];
                let sensor = col(12) as u8;
                AxisConfig {
                    max_speed: col(0),
                    max_accel: col(1),
                    max_decel: col(2),
                    start_speed: col(3),
                    offset_speed: col(4),
                    origin_speed: col(5),
                    origin_offset: col(6),
                    limit_plus: col(7),
                    limit_minus: col(8),
                    pulse_length: col(9),
                    origin_order: col(10) as u8,
                    origin_dir: OriginDirection::from_u8(col(11) as u8),
                    origin_sensor: OriginSensorMode::from_u8(sensor).unwrap_or_default(),
                    in_position: col(13) != 0.0,
                    motor: MotorFamily::from_u8(col(14) as u8),
                }
            })
            .collect();

        Self::new(axes)
    }

    /// Serialize as the legacy project file.
    pub fn to_sys(&self) -> String {
        let stamp = chrono::Local::now().format(STORE_TIMESTAMP_FORMAT);
        let mut out = String::new();
        let _ = writeln!(out, "{PROJECT_TAG}");
        let _ = writeln!(out, "DataType={SYS_DATA_TYPE}");
        let _ = writeln!(out, "Version={STORE_VERSION}");
        let _ = writeln!(out, "TimeStamp={stamp}");
        let _ = writeln!(out);
        let _ = writeln!(out, "{SYS_PARAM_TAG}");

        for (k, key) in SYS_KEYS.iter().enumerate() {
            let row = self
                .axes
                .iter()
                .map(|a| match k {
                    0 => a.max_speed.to_string(),
                    1 => a.max_accel.to_string(),
                    2 => a.max_decel.to_string(),
                    3 => a.start_speed.to_string(),
                    4 => a.offset_speed.to_string(),
                    5 => a.origin_speed.to_string(),
                    6 => a.origin_offset.to_string(),
                    7 => a.limit_plus.to_string(),
                    8 => a.limit_minus.to_string(),
                    9 => a.pulse_length.to_string(),
                    10 => a.origin_order.to_string(),
                    11 => a.origin_dir.as_u8().to_string(),
                    12 => a.origin_sensor.as_u8().to_string(),
                    13 => u8::from(a.in_position).to_string(),
                    _ => a.motor.as_u8().to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{key}={row}");
        }
        out
    }
}

fn is_legacy(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sys"))
}

fn header_value<'a>(line: Option<&'a str>, key: &str) -> Result<&'a str, ConfigError> {
    line.and_then(|l| l.split_once('='))
        .filter(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim())
        .ok_or_else(|| ConfigError::ParseError(format!("missing {key} header")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_table_has_three_axes() {
        let store = AxisParameterStore::default();
        assert_eq!(store.axes().len(), AXIS_COUNT);
        assert_eq!(store.configured().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(store.axis(2).unwrap().limit_plus, 100.5);
        assert_eq!(store.axis(2).unwrap().origin_order, 1);
        assert!(store.validate().is_ok());
    }

    #[test]
    fn sys_round_trip_preserves_values() {
        let mut axes = AxisParameterStore::default().axes().to_vec();
        axes[1].origin_sensor = OriginSensorMode::Auto;
        axes[1].origin_offset = 1.25;
        axes[3] = AxisConfig::with_motor(MotorFamily::ActuatorB, 50.0, 3);
        let store = AxisParameterStore::new(axes).unwrap();

        let text = store.to_sys();
        assert!(text.starts_with("[Project]\nDataType=SPLEBO-N.SYS\nVersion=1.00\n"));
        assert!(text.contains("LimitPlus=300.5,300.5,100.5,50,100,100,100,100"));

        let parsed = AxisParameterStore::from_sys(&text).unwrap();
        assert_eq!(parsed, store);
    }

    #[test]
    fn sys_wrong_data_type_is_rejected() {
        let text = AxisParameterStore::default()
            .to_sys()
            .replace("SPLEBO-N.SYS", "SPLEBO-N.POS");
        assert!(matches!(
            AxisParameterStore::from_sys(&text),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn sys_wrong_version_is_rejected() {
        let text = AxisParameterStore::default()
            .to_sys()
            .replace("Version=1.00", "Version=2.00");
        assert!(matches!(
            AxisParameterStore::from_sys(&text),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn sys_missing_key_is_rejected() {
        let text: String = AxisParameterStore::default()
            .to_sys()
            .lines()
            .filter(|l| !l.starts_with("PulseLength"))
            .map(|l| format!("{l}\n"))
            .collect();
        let err = AxisParameterStore::from_sys(&text).unwrap_err();
        assert!(err.to_string().contains("PulseLength"));
    }

    #[test]
    fn sys_bad_number_is_rejected() {
        let text = AxisParameterStore::default()
            .to_sys()
            .replace("MaxSpeed=100", "MaxSpeed=fast");
        assert!(matches!(
            AxisParameterStore::from_sys(&text),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn unknown_motor_type_means_unpopulated() {
        let text = AxisParameterStore::default()
            .to_sys()
            .replace("MotorType=1,1,1,0", "MotorType=1,1,1,7");
        let store = AxisParameterStore::from_sys(&text).unwrap();
        assert_eq!(store.axis(3).unwrap().motor, MotorFamily::None);
    }

    #[test]
    fn file_codec_selected_by_extension() {
        let dir = TempDir::new().unwrap();
        let store = AxisParameterStore::default();

        let sys = dir.path().join("SPLEBO-N.sys");
        store.save(&sys).unwrap();
        assert!(std::fs::read_to_string(&sys).unwrap().starts_with("[Project]"));
        assert_eq!(AxisParameterStore::load(&sys).unwrap(), store);

        let toml_path = dir.path().join("axes.toml");
        store.save(&toml_path).unwrap();
        assert!(std::fs::read_to_string(&toml_path).unwrap().contains("[[axes]]"));
        assert_eq!(AxisParameterStore::load(&toml_path).unwrap(), store);
    }

    #[test]
    fn toml_short_table_is_padded() {
        let store = AxisParameterStore::from_toml_str(
            r#"
[[axes]]
motor = "stepping_motor"
limit_plus = 200.0
"#,
        )
        .unwrap();
        assert_eq!(store.axes().len(), AXIS_COUNT);
        assert_eq!(store.configured().count(), 1);
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = AxisParameterStore::load(Path::new("/nonexistent/axes.sys")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }
}
