//! On-disk codecs of the teaching-point store.
//!
//! Both codecs map text to a [`PositionDocument`] and back; nothing else
//! in the crate knows either layout.
//!
//! JSON:
//!
//! ```json
//! { "data_type": "SPLEBO-N.POS", "version": "1.00", "timestamp": "...",
//!   "positions": [ { "point_no": 1, "x": 0.0, ..., "comment": "Home Position" } ] }
//! ```
//!
//! Legacy `.pos`:
//!
//! ```text
//! [Position]
//! DataType=SPLEBO-N.POS
//! Version=1.00
//! TimeStamp=2024/01/01 12:00:00
//! [Point]
//! Count=1
//! Item1=1,0,0,0,0,,,,,,0,Home Position
//! ```
//!
//! Item fields: point, abs flag (`0` = absolute), x, y, z, u, s1, s2, a, b,
//! protect flag, comment. Empty coordinates read as 0.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use splebo_common::config::PositionFormat;
use splebo_common::consts::{POS_DATA_TYPE, STORE_VERSION};
use splebo_common::error::{RobotError, RobotResult};

use super::position::Position;

const POSITION_TAG: &str = "[Position]";
const POINT_TAG: &str = "[Point]";
/// Fields before the comment in a legacy item.
const ITEM_FIELDS: usize = 11;

/// The whole store as read from or written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDocument {
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub positions: Vec<Position>,
}

fn default_data_type() -> String {
    POS_DATA_TYPE.to_string()
}
fn default_version() -> String {
    STORE_VERSION.to_string()
}

impl PositionDocument {
    pub fn new(timestamp: impl Into<String>, positions: Vec<Position>) -> Self {
        Self {
            data_type: default_data_type(),
            version: default_version(),
            timestamp: timestamp.into(),
            positions,
        }
    }

    /// Reject stores of another type or version.
    fn check_header(&self) -> RobotResult<()> {
        if self.data_type != POS_DATA_TYPE {
            return Err(RobotError::Persistence(format!(
                "wrong DataType: expected {POS_DATA_TYPE}, found {}",
                self.data_type
            )));
        }
        if !self.version.starts_with(STORE_VERSION) {
            return Err(RobotError::Persistence(format!(
                "wrong Version: expected {STORE_VERSION}, found {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Text layout of the store.
pub trait PositionCodec: Send + Sync {
    fn decode(&self, text: &str) -> RobotResult<PositionDocument>;
    fn encode(&self, doc: &PositionDocument) -> RobotResult<String>;
}

/// Codec for a configured format.
pub fn codec_for(format: PositionFormat) -> &'static dyn PositionCodec {
    match format {
        PositionFormat::Json => &JsonCodec,
        PositionFormat::Legacy => &LegacyCodec,
    }
}

// ─── JSON ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PositionCodec for JsonCodec {
    fn decode(&self, text: &str) -> RobotResult<PositionDocument> {
        let doc: PositionDocument = serde_json::from_str(text)
            .map_err(|e| RobotError::Persistence(format!("position store: {e}")))?;
        doc.check_header()?;
        Ok(doc)
    }

    fn encode(&self, doc: &PositionDocument) -> RobotResult<String> {
        serde_json::to_string_pretty(doc)
            .map_err(|e| RobotError::Persistence(format!("position store: {e}")))
    }
}

// ─── Legacy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl PositionCodec for LegacyCodec {
    fn decode(&self, text: &str) -> RobotResult<PositionDocument> {
        let mut doc = PositionDocument::new("", Vec::new());
        let mut section = "";
        let mut seen_header = false;

        for (lineno, line) in text.lines().map(str::trim).enumerate() {
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                section = line;
                seen_header |= line == POSITION_TAG;
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match section {
                POSITION_TAG => match key {
                    "DataType" => doc.data_type = value.to_string(),
                    "Version" => doc.version = value.to_string(),
                    "TimeStamp" => doc.timestamp = value.to_string(),
                    _ => {}
                },
                POINT_TAG if key.starts_with("Item") => {
                    doc.positions.push(parse_item(value, lineno + 1)?);
                }
                _ => {}
            }
        }
        if !seen_header {
            return Err(RobotError::Persistence(format!(
                "position store: missing {POSITION_TAG} section"
            )));
        }
        doc.check_header()?;
        Ok(doc)
    }

    fn encode(&self, doc: &PositionDocument) -> RobotResult<String> {
        let mut out = String::new();
        let _ = writeln!(out, "{POSITION_TAG}");
        let _ = writeln!(out, "DataType={}", doc.data_type);
        let _ = writeln!(out, "Version={}", doc.version);
        let _ = writeln!(out, "TimeStamp={}", doc.timestamp);
        let _ = writeln!(out, "{POINT_TAG}");
        let _ = writeln!(out, "Count={}", doc.positions.len());
        for (i, pos) in doc.positions.iter().enumerate() {
            if pos.comment.contains(['\n', '\r']) {
                return Err(RobotError::Persistence(format!(
                    "point {}: comment spans lines",
                    pos.point_no
                )));
            }
            let coords = pos
                .coords()
                .iter()
                .enumerate()
                .map(|(axis, &v)| {
                    // X, Y, Z always written; unused higher axes left empty.
                    if axis < 3 || v != 0.0 {
                        v.to_string()
                    } else {
                        String::new()
                    }
                })
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(
                out,
                "Item{}={},{},{},{},{}",
                i + 1,
                pos.point_no,
                if pos.is_absolute { 0 } else { 1 },
                coords,
                u8::from(pos.is_protected),
                pos.comment
            );
        }
        Ok(out)
    }
}

/// One `ItemN=` value. The comment keeps any commas it contains.
fn parse_item(value: &str, lineno: usize) -> RobotResult<Position> {
    let fields: Vec<&str> = value.splitn(ITEM_FIELDS + 1, ',').collect();
    if fields.len() < ITEM_FIELDS {
        return Err(RobotError::Persistence(format!(
            "line {lineno}: expected at least {ITEM_FIELDS} fields, found {}",
            fields.len()
        )));
    }
    let number = |idx: usize| -> RobotResult<f64> {
        let s = fields[idx].trim();
        if s.is_empty() {
            return Ok(0.0);
        }
        s.parse::<f64>().map_err(|_| {
            RobotError::Persistence(format!("line {lineno}: invalid number '{s}'"))
        })
    };

    let point_no = fields[0].trim().parse::<u32>().map_err(|_| {
        RobotError::Persistence(format!("line {lineno}: invalid point number '{}'", fields[0]))
    })?;
    let mut pos = Position::new(point_no);
    pos.is_absolute = fields[1].trim() == "0";
    for axis in 0..8u8 {
        pos.set_axis(axis, number(2 + axis as usize)?);
    }
    pos.is_protected = fields[10].trim() == "1";
    pos.comment = fields.get(ITEM_FIELDS).map(|c| c.to_string()).unwrap_or_default();
    Ok(pos)
}
