//! Filesystem helpers shared by every stage.
//!
//! All of these are safe to repeat: creating a directory that exists,
//! removing a path that is gone, or overwriting a copy are no-ops or
//! produce the same result.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Create a directory and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        debug!("creating directory {}", dir.display());
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Ok(())
}

/// Copy one file, creating the destination's parent and overwriting it.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    debug!("copy {} -> {}", src.display(), dst.display());
    fs::copy(src, dst)
        .with_context(|| format!("cannot copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Copy a directory tree recursively.
///
/// A missing source is logged and skipped, not an error.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.exists() {
        warn!("copy_tree: source not found: {}", src.display());
        return Ok(());
    }

    if src.is_file() {
        return copy_file(src, dst);
    }

    ensure_dir(dst)?;
    for entry in fs::read_dir(src).with_context(|| format!("cannot read {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            copy_file(&from, &to)?;
        }
    }
    Ok(())
}

/// Read a UTF-8 text file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

/// Write a text file, creating its parent directory.
///
/// The content goes to a sibling temp file that is then renamed over
/// `path`, so an interrupted write never leaves a truncated target.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = temp_sibling(path);
    if tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }

    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("cannot create {}", tmp.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("cannot flush {}", tmp.display()))?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| {
            format!("cannot move {} into place at {}", tmp.display(), path.display())
        });
    }
    Ok(())
}

/// `dir/.name.ffprep-tmp` next to `path`.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.ffprep-tmp", name))
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Remove a file or directory tree. Missing paths are ignored.
pub fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() && !path.is_symlink() {
        fs::remove_dir_all(path).with_context(|| format!("cannot remove {}", path.display()))?;
        debug!("removed {}", path.display());
    } else if path.exists() || path.is_symlink() {
        fs::remove_file(path).with_context(|| format!("cannot remove {}", path.display()))?;
        debug!("removed {}", path.display());
    }
    Ok(())
}

/// True when both paths are regular files with identical bytes.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool> {
    if !a.is_file() || !b.is_file() {
        return Ok(false);
    }
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_encode(&Sha256::digest(bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
