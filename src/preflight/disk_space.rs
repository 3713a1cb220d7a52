//! Disk space check.
//!
//! A vcpkg checkout plus an FFmpeg build tree with x264 runs to several
//! gigabytes before the source tree is even extracted.

use super::CheckResult;
use crate::config::PrepContext;
use crate::process::Cmd;
use std::path::Path;

/// Minimum free space at the project root (10 GB).
const MIN_DISK_SPACE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Check free space under the project root with `df`. Not checked on Windows.
pub fn check_disk_space(ctx: &PrepContext) -> CheckResult {
    if !ctx.platform.os.is_posix() {
        return CheckResult::pass("Disk space", "Not checked on Windows");
    }

    let required_gb = MIN_DISK_SPACE_BYTES as f64 / GB;
    match available_space(existing_ancestor(&ctx.config.project_root)) {
        Some(available) if available >= MIN_DISK_SPACE_BYTES => CheckResult::pass(
            "Disk space",
            format!(
                "{:.1} GB available (need {:.1} GB)",
                available as f64 / GB,
                required_gb
            ),
        ),
        Some(available) => CheckResult::fail(
            "Disk space",
            format!(
                "Only {:.1} GB available, need {:.1} GB",
                available as f64 / GB,
                required_gb
            ),
            "Free up disk space or point FFPREP_VCPKG_ROOT at a larger disk",
        ),
        None => CheckResult::fail(
            "Disk space",
            "Failed to check available disk space",
            "Ensure the df command is available",
        ),
    }
}

/// Available bytes on the filesystem holding `path`.
pub fn available_space(path: &Path) -> Option<u64> {
    Cmd::new("df")
        .arg("-Pk")
        .arg_path(path)
        .allow_fail()
        .run()
        .ok()
        .filter(|r| r.success())
        .and_then(|r| parse_df_available(&r.stdout))
}

/// Parse POSIX `df -Pk` output: header line, then
/// `filesystem blocks used available capacity mountpoint`.
fn parse_df_available(stdout: &str) -> Option<u64> {
    let line = stdout.lines().nth(1)?;
    let kib: u64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(kib * 1024)
}

/// `df` needs a path that exists; the project root may not yet.
fn existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("."))
}
