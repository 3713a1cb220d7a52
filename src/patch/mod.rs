//! Source patches applied to the extracted FFmpeg tree.
//!
//! Both patches are plain text edits with explicit checks on either side:
//! the edit only happens if its anchor text is found, and the written file
//! is read back and must contain the expected result. A patch counts as
//! already applied when its marker string is present in the target; the
//! contents are never diffed.
//!
//! - [`stdbit`]: C23 `<stdbit.h>` fallback for `fftools/ffmpeg_dec.c`
//! - [`entry`]: `main` -> `ffmpeg_entry` rewrite of `fftools/ffmpeg.c`

pub mod entry;
pub mod stdbit;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::PrepError;
use crate::fsutil;
use crate::Outcome;

pub use entry::generate_entry_source;
pub use stdbit::apply_compat_shim;

/// A marker-detected, idempotent text patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub id: &'static str,
    pub target: PathBuf,
    /// Text whose presence in `target` means the patch is in place.
    pub marker: &'static str,
}

impl PatchRecord {
    pub fn new(id: &'static str, target: impl Into<PathBuf>, marker: &'static str) -> Self {
        Self {
            id,
            target: target.into(),
            marker,
        }
    }

    /// True if the target exists and contains the marker.
    pub fn is_applied(&self) -> Result<bool> {
        if !self.target.is_file() {
            return Ok(false);
        }
        Ok(fsutil::read_text(&self.target)?.contains(self.marker))
    }

    /// Read the target back and fail if the marker is absent.
    pub fn verify_applied(&self) -> Result<()> {
        if self.is_applied()? {
            Ok(())
        } else {
            Err(PrepError::PostConditionFailed {
                path: self.target.clone(),
                expected: self.marker.to_string(),
            }
            .into())
        }
    }
}

/// Result of applying a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// Marker already present.
    AlreadyApplied,
    /// Target exists but the text to replace is not in it.
    NotApplicable,
    /// Target file does not exist.
    TargetAbsent,
}

impl PatchOutcome {
    pub fn outcome(&self) -> Outcome {
        match self {
            PatchOutcome::Applied => Outcome::Done,
            PatchOutcome::AlreadyApplied
            | PatchOutcome::NotApplicable
            | PatchOutcome::TargetAbsent => Outcome::Skipped,
        }
    }
}

/// Path of `rel` inside the source root.
fn in_tree(source_root: &Path, rel: &str) -> PathBuf {
    source_root.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_record_detects_marker() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("file.c");
        let record = PatchRecord::new("demo", &target, "/* demo */");
        assert!(!record.is_applied().unwrap());

        fs::write(&target, "int x;\n").unwrap();
        assert!(!record.is_applied().unwrap());
        assert!(record.verify_applied().is_err());

        fs::write(&target, "/* demo */\nint x;\n").unwrap();
        assert!(record.is_applied().unwrap());
        record.verify_applied().unwrap();
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(PatchOutcome::Applied.outcome(), Outcome::Done);
        assert_eq!(PatchOutcome::TargetAbsent.outcome(), Outcome::Skipped);
    }
}
