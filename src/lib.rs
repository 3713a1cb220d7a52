//! FFmpeg source preparation for embedding.
//!
//! Installs FFmpeg through vcpkg, extracts the matching source archive into
//! a canonical tree, copies vcpkg's generated configuration headers into it,
//! and rewrites `fftools/ffmpeg.c` so that `main` becomes a callable
//! `ffmpeg_entry`. Every stage checks for its own output first, so a run
//! that failed halfway can simply be started again.

pub mod config;
pub mod config_sync;
pub mod deps;
pub mod error;
pub mod extract;
pub mod fsutil;
pub mod patch;
pub mod pipeline;
pub mod platform;
pub mod preflight;
pub mod process;
pub mod toolchain;

#[cfg(test)]
mod testutil;

use std::time::Instant;

use tracing::info;

/// What an idempotent operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Work was performed and artifacts changed.
    Done,
    /// The artifact was already in place; nothing changed.
    Skipped,
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }

    /// Combine sub-operations: skipped only if every part was skipped.
    pub fn and(self, other: Outcome) -> Outcome {
        if self.is_skipped() && other.is_skipped() {
            Outcome::Skipped
        } else {
            Outcome::Done
        }
    }
}

/// Wall-clock timer for a named stage.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Log the elapsed time and return it in seconds.
    pub fn finish(self) -> f64 {
        let secs = self.elapsed_secs();
        if secs >= 60.0 {
            info!("{} took {:.1}m", self.label, secs / 60.0);
        } else {
            info!("{} took {:.1}s", self.label, secs);
        }
        secs
    }
}
