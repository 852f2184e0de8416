//! Persistent teaching-point table.

use std::path::{Path, PathBuf};

use splebo_common::config::PositionFormat;
use splebo_common::consts::STORE_TIMESTAMP_FORMAT;
use splebo_common::error::{RobotError, RobotResult};
use tracing::{debug, info, warn};

use super::codec::{PositionDocument, codec_for};
use super::position::Position;

/// Comment of the point created for an empty store.
pub const HOME_COMMENT: &str = "Home Position";

/// Points sorted by number, bound to one file.
#[derive(Debug, Clone)]
pub struct PositionTable {
    positions: Vec<Position>,
    path: PathBuf,
    format: PositionFormat,
    modified: bool,
}

impl PositionTable {
    /// Table with only the home point, not yet written.
    pub fn with_defaults(path: impl Into<PathBuf>, format: PositionFormat) -> Self {
        Self {
            positions: vec![Position::new(1).with_comment(HOME_COMMENT)],
            path: path.into(),
            format,
            modified: true,
        }
    }

    /// Load the store, creating it with the home point when missing.
    pub fn load(path: impl Into<PathBuf>, format: PositionFormat) -> RobotResult<Self> {
        let path = path.into();
        if !path.exists() {
            info!(path = %path.display(), "Position store missing, creating default");
            let mut table = Self::with_defaults(path, format);
            table.save()?;
            return Ok(table);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            RobotError::Persistence(format!("cannot read {}: {e}", path.display()))
        })?;
        let doc = codec_for(format).decode(&text)?;
        let mut positions = doc.positions;
        positions.sort_by_key(|p| p.point_no);
        if let Some(dup) = positions.windows(2).find(|w| w[0].point_no == w[1].point_no) {
            return Err(RobotError::Persistence(format!(
                "{}: point {} stored twice",
                path.display(),
                dup[0].point_no
            )));
        }
        if let Some(bad) = positions.iter().find(|p| p.validate().is_err()) {
            warn!(point_no = bad.point_no, "Stored comment contains a line break");
        }
        info!(path = %path.display(), count = positions.len(), "Position store loaded");
        Ok(Self {
            positions,
            path,
            format,
            modified: false,
        })
    }

    /// Write the whole table through a sibling temp file and rename.
    pub fn save(&mut self) -> RobotResult<()> {
        let stamp = chrono::Local::now().format(STORE_TIMESTAMP_FORMAT).to_string();
        let doc = PositionDocument::new(stamp, self.positions.clone());
        let text = codec_for(self.format).encode(&doc)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                RobotError::Persistence(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                RobotError::Persistence(format!("cannot write {}: {e}", self.path.display()))
            })?;
        self.modified = false;
        debug!(path = %self.path.display(), count = self.positions.len(), "Position store saved");
        Ok(())
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn format(&self) -> PositionFormat {
        self.format
    }

    /// Unsaved changes present.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// All points in ascending number order.
    pub fn all(&self) -> &[Position] {
        &self.positions
    }

    pub fn get(&self, point_no: u32) -> Option<&Position> {
        self.index(point_no).ok().map(|i| &self.positions[i])
    }

    fn index(&self, point_no: u32) -> Result<usize, usize> {
        self.positions.binary_search_by_key(&point_no, |p| p.point_no)
    }

    fn require(&self, point_no: u32) -> RobotResult<usize> {
        self.index(point_no)
            .map_err(|_| RobotError::validation(format!("point {point_no} not found")))
    }

    fn require_unprotected(&self, point_no: u32) -> RobotResult<usize> {
        let idx = self.require(point_no)?;
        if self.positions[idx].is_protected {
            return Err(RobotError::validation(format!("point {point_no} is protected")));
        }
        Ok(idx)
    }

    // ─── Editing ────────────────────────────────────────────────────

    /// Insert a new point. Fails if the number is taken.
    pub fn add(&mut self, position: Position) -> RobotResult<()> {
        position.validate()?;
        match self.index(position.point_no) {
            Ok(_) => Err(RobotError::validation(format!(
                "point {} already exists",
                position.point_no
            ))),
            Err(idx) => {
                self.positions.insert(idx, position);
                self.modified = true;
                Ok(())
            }
        }
    }

    /// Replace an existing, unprotected point.
    pub fn update(&mut self, position: Position) -> RobotResult<()> {
        position.validate()?;
        let idx = self.require_unprotected(position.point_no)?;
        self.positions[idx] = position;
        self.modified = true;
        Ok(())
    }

    /// Insert or replace without protection checks.
    pub fn upsert(&mut self, position: Position) -> RobotResult<()> {
        position.validate()?;
        match self.index(position.point_no) {
            Ok(idx) => self.positions[idx] = position,
            Err(idx) => self.positions.insert(idx, position),
        }
        self.modified = true;
        Ok(())
    }

    pub fn delete(&mut self, point_no: u32) -> RobotResult<Position> {
        let idx = self.require_unprotected(point_no)?;
        self.modified = true;
        Ok(self.positions.remove(idx))
    }

    /// Duplicate `from` as `to`, replacing any unprotected `to`.
    pub fn copy(&mut self, from: u32, to: u32) -> RobotResult<()> {
        let idx = self.require(from)?;
        if let Some(existing) = self.get(to).filter(|p| p.is_protected) {
            return Err(RobotError::validation(format!(
                "point {} is protected",
                existing.point_no
            )));
        }
        let mut copy = self.positions[idx].clone();
        copy.point_no = to;
        copy.is_protected = false;
        copy.comment = format!("Copy from P{from}");
        self.upsert(copy)
    }

    /// Record a live pose as an absolute point, keeping its protection flag.
    pub fn teach(
        &mut self,
        point_no: u32,
        pose: &[f64],
        comment: impl Into<String>,
    ) -> RobotResult<()> {
        let mut pos = Position::from_coords(point_no, pose, comment);
        pos.is_protected = self.get(point_no).is_some_and(|p| p.is_protected);
        self.upsert(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splebo_common::error::ErrorKind;

    fn table(dir: &tempfile::TempDir, format: PositionFormat) -> PositionTable {
        PositionTable::load(dir.path().join("teach.pos"), format).unwrap()
    }

    #[test]
    fn missing_store_created_with_home_point() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(&dir, PositionFormat::Legacy);
        assert!(table.path().exists());
        assert!(!table.is_modified());
        assert_eq!(table.len(), 1);
        let home = table.get(1).unwrap();
        assert_eq!(home.comment, HOME_COMMENT);
        assert!(home.is_absolute);

        let text = std::fs::read_to_string(table.path()).unwrap();
        assert!(text.contains("Item1=1,0,0,0,0,,,,,,0,Home Position"));
    }

    #[test]
    fn edits_keep_points_sorted_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table(&dir, PositionFormat::Json);
        t.add(Position::from_coords(10, &[1.0, 2.0, 3.0], "ten")).unwrap();
        t.add(Position::from_coords(5, &[4.0], "five")).unwrap();
        assert_eq!(t.add(Position::new(5)).unwrap_err().kind(), ErrorKind::Validation);
        t.copy(10, 7).unwrap();
        assert!(t.is_modified());
        t.save().unwrap();

        let reloaded = table(&dir, PositionFormat::Json);
        let numbers: Vec<u32> = reloaded.all().iter().map(|p| p.point_no).collect();
        assert_eq!(numbers, [1, 5, 7, 10]);
        let copy = reloaded.get(7).unwrap();
        assert_eq!(copy.comment, "Copy from P10");
        assert_eq!((copy.x, copy.y, copy.z), (1.0, 2.0, 3.0));
    }

    #[test]
    fn protected_points_refuse_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table(&dir, PositionFormat::Json);
        let mut locked = Position::from_coords(3, &[9.0], "locked");
        locked.is_protected = true;
        t.add(locked).unwrap();

        assert!(t.update(Position::new(3)).is_err());
        assert!(t.delete(3).is_err());
        assert!(t.copy(1, 3).is_err());
        assert!(t.update(Position::new(99)).is_err());
        assert!(t.delete(99).is_err());

        t.teach(3, &[1.0, 1.0, 1.0], "retaught").unwrap();
        let p = t.get(3).unwrap();
        assert!(p.is_protected);
        assert_eq!(p.comment, "retaught");

        assert_eq!(t.delete(1).unwrap().comment, HOME_COMMENT);
        assert!(t.get(1).is_none());
    }

    #[test]
    fn line_breaks_cannot_reach_the_legacy_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table(&dir, PositionFormat::Legacy);
        let forged = "a\nItem9=77,0,9,9,9,,,,,,0,injected";
        let err = t
            .add(Position::from_coords(5, &[1.0], forged))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(t.teach(5, &[1.0], forged).is_err());
        assert!(t.update(Position::new(1).with_comment("x\ry")).is_err());

        t.add(Position::from_coords(5, &[1.0], "a, b; c")).unwrap();
        t.save().unwrap();
        let reloaded = table(&dir, PositionFormat::Legacy);
        let numbers: Vec<u32> = reloaded.all().iter().map(|p| p.point_no).collect();
        assert_eq!(numbers, [1, 5]);
        assert_eq!(reloaded.get(5).unwrap().comment, "a, b; c");
    }

    #[test]
    fn duplicate_point_in_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teach.pos");
        std::fs::write(
            &path,
            "[Position]\nDataType=SPLEBO-N.POS\nVersion=1.00\n[Point]\nCount=2\n\
             Item1=4,0,1,1,1,,,,,,0,first\nItem2=4,0,2,2,2,,,,,,0,second\n",
        )
        .unwrap();
        let err = PositionTable::load(&path, PositionFormat::Legacy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.to_string().contains("point 4"), "{err}");
    }

    #[test]
    fn corrupt_store_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teach.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PositionTable::load(&path, PositionFormat::Json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
