//! Copy vcpkg's generated configuration headers into the source tree.
//!
//! vcpkg runs FFmpeg's `configure` in its build tree; the resulting
//! `config.h` and `config_components.h` describe the feature set the
//! installed libraries were built with. The fftools sources compiled by the
//! host need the same headers next to them.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::PrepContext;
use crate::fsutil;
use crate::Outcome;

/// Generated headers copied verbatim from the build tree.
pub const GENERATED_HEADERS: &[&str] = &["config.h", "config_components.h"];

/// What happened to one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSync {
    Copied,
    /// Destination already byte-identical.
    Unchanged,
    /// Not present in the build tree; the build falls back to defaults.
    SourceMissing(PathBuf),
}

/// Per-header results of a sync.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub headers: Vec<(&'static str, HeaderSync)>,
}

impl SyncReport {
    /// Skipped only when every header was already up to date. A missing
    /// header keeps the step visible so its warning is not hidden behind
    /// a skip.
    pub fn outcome(&self) -> Outcome {
        if self
            .headers
            .iter()
            .all(|(_, sync)| *sync == HeaderSync::Unchanged)
        {
            Outcome::Skipped
        } else {
            Outcome::Done
        }
    }

    /// Headers vcpkg did not generate.
    pub fn missing(&self) -> Vec<&'static str> {
        self.headers
            .iter()
            .filter(|(_, sync)| matches!(sync, HeaderSync::SourceMissing(_)))
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Copy each generated header into the canonical source root.
///
/// A missing header is a warning. Failing to copy one that exists is fatal.
pub fn sync_config_headers(ctx: &PrepContext) -> Result<SyncReport> {
    let buildtree = ctx.buildtree_dir();
    let dest_root = &ctx.config.source_root;
    let mut report = SyncReport::default();

    for &name in GENERATED_HEADERS {
        let src = buildtree.join(name);
        let dst = dest_root.join(name);

        let result = if !src.exists() {
            warn!(
                "vcpkg {} not found at {}; building with default configuration",
                name,
                src.display()
            );
            HeaderSync::SourceMissing(src)
        } else if fsutil::files_identical(&src, &dst)? {
            info!("[SKIP] {} up to date", name);
            HeaderSync::Unchanged
        } else {
            fsutil::copy_file(&src, &dst)?;
            info!("copied {}", name);
            HeaderSync::Copied
        };
        report.headers.push((name, result));
    }

    Ok(report)
}
