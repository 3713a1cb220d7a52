//! FFmpeg source extraction.
//!
//! vcpkg leaves the FFmpeg source tarball it built from in its download
//! cache. This module turns that tarball into the canonical tree at
//! `lib_sources/ffmpeg`.
//!
//! # Extract Flow
//!
//! ```text
//! 1. lib_sources/ffmpeg exists and is complete  -> done
//! 2. lib_sources/ffmpeg exists but incomplete   -> delete it
//! 3. find vcpkg/downloads/ffmpeg-*.tar.gz
//! 4. unpack into lib_sources/ (yields FFmpeg-<tag>/)
//! 5. rename FFmpeg-<tag>/ -> ffmpeg/
//! 6. check the required fftools sources
//! ```

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use tracing::{info, warn};

use crate::config::PrepContext;
use crate::error::PrepError;
use crate::fsutil;
use crate::Outcome;

/// Download cache filename prefix.
pub const ARCHIVE_PREFIX: &str = "ffmpeg-";
/// Download cache filename suffix.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
/// Prefix of the archive's top-level directory.
pub const EXTRACTED_PREFIX: &str = "FFmpeg-";

/// Files that must exist for the tree to be usable, relative to its root.
pub const REQUIRED_FILES: &[&str] = &[
    "fftools/cmdutils.c",
    "fftools/ffmpeg_dec.c",
    "fftools/ffmpeg_demux.c",
    "fftools/ffmpeg_enc.c",
    "fftools/ffmpeg_filter.c",
    "fftools/ffmpeg_mux.c",
    "fftools/ffmpeg_mux_init.c",
    "fftools/ffmpeg_opt.c",
    "fftools/ffmpeg_sched.c",
    "fftools/objpool.c",
    "fftools/sync_queue.c",
    "fftools/thread_queue.c",
];

/// Source archive found in the vcpkg download cache.
#[derive(Debug, Clone)]
pub struct AcquiredArchive {
    pub path: PathBuf,
    /// Filename between the prefix and suffix, e.g. `n7.1`.
    pub version_tag: String,
    pub discovered_at: DateTime<Utc>,
}

/// Result of checking a tree against [`REQUIRED_FILES`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationState {
    Verified,
    /// The root exists; these relative paths are absent or empty.
    Incomplete(Vec<String>),
    /// The root itself does not exist.
    Missing,
}

/// The canonical FFmpeg source tree.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    pub state: VerificationState,
}

impl SourceTree {
    /// Check `root` against the required file list.
    ///
    /// A zero-length required file counts as missing: no FFmpeg source is
    /// empty, and an interrupted write must force a fresh extraction.
    pub fn inspect(root: &Path) -> Self {
        let state = if !root.is_dir() {
            VerificationState::Missing
        } else {
            let missing: Vec<String> = REQUIRED_FILES
                .iter()
                .filter(|rel| !has_content(&root.join(rel)))
                .map(|rel| rel.to_string())
                .collect();
            if missing.is_empty() {
                VerificationState::Verified
            } else {
                VerificationState::Incomplete(missing)
            }
        };

        Self {
            root: root.to_path_buf(),
            state,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.state == VerificationState::Verified
    }

    /// Turn anything but [`VerificationState::Verified`] into an error
    /// naming every missing file.
    pub fn require_verified(self) -> Result<Self> {
        let missing = match &self.state {
            VerificationState::Verified => return Ok(self),
            VerificationState::Incomplete(missing) => missing.clone(),
            VerificationState::Missing => REQUIRED_FILES.iter().map(|s| s.to_string()).collect(),
        };
        Err(PrepError::ManifestIncomplete {
            root: self.root,
            missing,
        }
        .into())
    }
}

/// Extracts and checks the FFmpeg source tree for one [`PrepContext`].
pub struct SourceAcquirer<'a> {
    ctx: &'a PrepContext,
}

impl<'a> SourceAcquirer<'a> {
    pub fn new(ctx: &'a PrepContext) -> Self {
        Self { ctx }
    }

    /// Archive filenames in the download cache, sorted. Does not log.
    pub fn archive_candidates(&self) -> Result<Vec<String>> {
        let downloads = self.ctx.config.downloads_dir();
        if !downloads.is_dir() {
            return Err(PrepError::DownloadCacheMissing { path: downloads }.into());
        }

        let mut candidates: Vec<String> = fs::read_dir(&downloads)
            .with_context(|| format!("cannot list {}", downloads.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX))
            .collect();
        candidates.sort();
        Ok(candidates)
    }

    /// True if the download cache holds at least one FFmpeg archive.
    pub fn has_archive(&self) -> bool {
        self.archive_candidates()
            .map(|candidates| !candidates.is_empty())
            .unwrap_or(false)
    }

    /// Find the FFmpeg archive in the vcpkg download cache.
    pub fn locate_archive(&self) -> Result<AcquiredArchive> {
        let downloads = self.ctx.config.downloads_dir();
        let mut candidates = self.archive_candidates()?;

        let name = match candidates.pop() {
            Some(name) => name,
            None => return Err(PrepError::ArchiveNotFound { dir: downloads }.into()),
        };
        if !candidates.is_empty() {
            warn!(
                "several FFmpeg archives in {}; using {} (ignoring {})",
                downloads.display(),
                name,
                candidates.join(", ")
            );
        }

        let version_tag = name[ARCHIVE_PREFIX.len()..name.len() - ARCHIVE_SUFFIX.len()].to_string();
        info!("found FFmpeg archive {}", name);

        Ok(AcquiredArchive {
            path: downloads.join(&name),
            version_tag,
            discovered_at: Utc::now(),
        })
    }

    /// Extract the archive into the canonical tree unless it is already complete.
    pub async fn extract_and_normalize(&self) -> Result<Outcome> {
        let config = &self.ctx.config;
        let target = &config.source_root;

        match SourceTree::inspect(target).state {
            VerificationState::Verified => {
                info!("[SKIP] FFmpeg source ready at {}", target.display());
                return Ok(Outcome::Skipped);
            }
            VerificationState::Incomplete(missing) => {
                warn!(
                    "source tree at {} is incomplete ({} files missing), extracting again",
                    target.display(),
                    missing.len()
                );
                fsutil::remove_path(target)?;
            }
            VerificationState::Missing => {}
        }

        let archive = self.locate_archive()?;
        fsutil::ensure_dir(&config.lib_sources)?;

        info!(
            "extracting {} into {}",
            archive.path.display(),
            config.lib_sources.display()
        );
        let archive_path = archive.path.clone();
        let dest = config.lib_sources.clone();
        let top_level = tokio::task::spawn_blocking(move || unpack_archive(&archive_path, &dest))
            .await
            .context("extraction task failed")??;

        let extracted = pick_extracted_dir(&config.lib_sources, &top_level)?;
        fs::rename(&extracted, target).with_context(|| {
            format!(
                "cannot rename {} to {}",
                extracted.display(),
                target.display()
            )
        })?;
        info!(
            "renamed {} -> {}",
            extracted.display(),
            target.display()
        );

        Ok(Outcome::Done)
    }

    /// Check the canonical tree; fatal if any required file is missing.
    pub fn verify_manifest(&self) -> Result<SourceTree> {
        SourceTree::inspect(&self.ctx.config.source_root).require_verified()
    }

    /// Extract if needed, then verify.
    pub async fn run(&self) -> Result<(Outcome, SourceTree)> {
        let outcome = self.extract_and_normalize().await?;
        let tree = self.verify_manifest()?;
        Ok((outcome, tree))
    }
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Unpack a `.tar.gz` into `dest`, returning the archive's top-level names.
fn unpack_archive(archive: &Path, dest: &Path) -> Result<BTreeSet<String>> {
    let file =
        File::open(archive).with_context(|| format!("cannot open {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut top_level = BTreeSet::new();

    for entry in tar
        .entries()
        .with_context(|| format!("cannot read {}", archive.display()))?
    {
        let mut entry = entry.with_context(|| format!("corrupt entry in {}", archive.display()))?;
        let path = entry.path()?.into_owned();
        if let Some(Component::Normal(first)) =
            path.components().find(|c| !matches!(c, Component::CurDir))
        {
            top_level.insert(first.to_string_lossy().into_owned());
        }
        entry
            .unpack_in(dest)
            .with_context(|| format!("cannot extract {}", path.display()))?;
    }

    Ok(top_level)
}

fn pick_extracted_dir(parent: &Path, top_level: &BTreeSet<String>) -> Result<PathBuf> {
    let mut dirs = top_level
        .iter()
        .filter(|name| name.starts_with(EXTRACTED_PREFIX))
        .map(|name| parent.join(name))
        .filter(|path| path.is_dir());

    match dirs.next() {
        Some(dir) => {
            if let Some(extra) = dirs.next() {
                warn!("archive has several top-level FFmpeg directories, ignoring {}", extra.display());
            }
            Ok(dir)
        }
        None => Err(PrepError::ExtractedDirNotFound {
            dir: parent.to_path_buf(),
            prefix: EXTRACTED_PREFIX.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        captured_logs, complete_tree_files, linux_ctx, seed_archive, write_archive,
    };
    use tempfile::tempdir;

    #[test]
    fn test_locate_archive_missing_cache() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let err = SourceAcquirer::new(&ctx).locate_archive().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>(),
            Some(PrepError::DownloadCacheMissing { .. })
        ));
        assert!(err.to_string().contains("ffprep install"));
    }

    #[tokio::test]
    async fn test_no_matching_archive_fails_before_extraction() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let downloads = ctx.config.downloads_dir();
        fs::create_dir_all(&downloads).unwrap();
        fs::write(downloads.join("x264-abc.tar.bz2"), b"").unwrap();
        fs::write(downloads.join("ffmpeg-n7.1.zip"), b"").unwrap();

        let err = SourceAcquirer::new(&ctx).extract_and_normalize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>(),
            Some(PrepError::ArchiveNotFound { .. })
        ));
        assert!(!ctx.config.lib_sources.exists());
    }

    #[test]
    fn test_locate_archive_version_tag() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        seed_archive(&ctx);

        let archive = SourceAcquirer::new(&ctx).locate_archive().unwrap();
        assert_eq!(archive.version_tag, "n7.1");
        assert!(archive.path.ends_with("ffmpeg-n7.1.tar.gz"));
    }

    #[test]
    fn test_has_archive_is_silent() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let acquirer = SourceAcquirer::new(&ctx);
        assert!(!acquirer.has_archive());

        seed_archive(&ctx);
        write_archive(
            &ctx.config.downloads_dir().join("ffmpeg-n6.1.tar.gz"),
            "FFmpeg-n6.1",
            &complete_tree_files(),
        );

        let mut found = false;
        let logs = captured_logs(|| found = acquirer.has_archive());
        assert!(found);
        assert_eq!(logs, "");
        assert_eq!(
            acquirer.archive_candidates().unwrap(),
            vec!["ffmpeg-n6.1.tar.gz".to_string(), "ffmpeg-n7.1.tar.gz".to_string()]
        );

        let logs = captured_logs(|| {
            acquirer.locate_archive().unwrap();
        });
        assert!(logs.contains("several FFmpeg archives"));
        assert!(logs.contains("found FFmpeg archive ffmpeg-n7.1.tar.gz"));
    }

    #[tokio::test]
    async fn test_extract_renames_and_verifies() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        seed_archive(&ctx);

        let acquirer = SourceAcquirer::new(&ctx);
        let (outcome, tree) = acquirer.run().await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert!(tree.is_verified());
        assert!(ctx.config.source_root.join("fftools/ffmpeg.c").is_file());
        assert!(!ctx.config.lib_sources.join("FFmpeg-n7.1").exists());

        let (again, _) = acquirer.run().await.unwrap();
        assert_eq!(again, Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_incomplete_tree_is_replaced() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        seed_archive(&ctx);

        let stale = ctx.config.source_root.join("fftools");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("leftover.c"), "stale").unwrap();

        let (outcome, tree) = SourceAcquirer::new(&ctx).run().await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert!(tree.is_verified());
        assert!(!stale.join("leftover.c").exists());
    }

    #[tokio::test]
    async fn test_manifest_names_exactly_the_missing_files() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let files: Vec<(String, String)> = complete_tree_files()
            .into_iter()
            .filter(|(rel, _)| rel != "fftools/objpool.c" && rel != "fftools/ffmpeg_sched.c")
            .collect();
        write_archive(
            &ctx.config.downloads_dir().join("ffmpeg-n7.1.tar.gz"),
            "FFmpeg-n7.1",
            &files,
        );

        let err = SourceAcquirer::new(&ctx).run().await.unwrap_err();
        match err.downcast_ref::<PrepError>() {
            Some(PrepError::ManifestIncomplete { missing, .. }) => {
                assert_eq!(
                    missing,
                    &vec![
                        "fftools/ffmpeg_sched.c".to_string(),
                        "fftools/objpool.c".to_string()
                    ]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_archive_without_ffmpeg_dir() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        write_archive(
            &ctx.config.downloads_dir().join("ffmpeg-n7.1.tar.gz"),
            "ffmpeg-source",
            &complete_tree_files(),
        );

        let err = SourceAcquirer::new(&ctx).extract_and_normalize().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>(),
            Some(PrepError::ExtractedDirNotFound { .. })
        ));
    }

    #[test]
    fn test_inspect_states() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("ffmpeg");
        assert_eq!(SourceTree::inspect(&root).state, VerificationState::Missing);

        fs::create_dir_all(root.join("fftools")).unwrap();
        match SourceTree::inspect(&root).state {
            VerificationState::Incomplete(missing) => assert_eq!(missing.len(), REQUIRED_FILES.len()),
            other => panic!("unexpected state: {:?}", other),
        }

        for rel in REQUIRED_FILES {
            fs::write(root.join(rel), "").unwrap();
        }
        match SourceTree::inspect(&root).state {
            VerificationState::Incomplete(missing) => assert_eq!(missing.len(), REQUIRED_FILES.len()),
            other => panic!("empty files passed: {:?}", other),
        }

        for rel in REQUIRED_FILES {
            fs::write(root.join(rel), "/* source */\n").unwrap();
        }
        assert!(SourceTree::inspect(&root).is_verified());
    }

    #[tokio::test]
    async fn test_truncated_file_triggers_extraction() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        seed_archive(&ctx);
        let acquirer = SourceAcquirer::new(&ctx);
        acquirer.run().await.unwrap();

        let dec = ctx.config.source_root.join("fftools/ffmpeg_dec.c");
        fs::write(&dec, "").unwrap();
        assert_eq!(
            SourceTree::inspect(&ctx.config.source_root).state,
            VerificationState::Incomplete(vec!["fftools/ffmpeg_dec.c".to_string()])
        );

        let (outcome, tree) = acquirer.run().await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert!(tree.is_verified());
        assert_eq!(fs::read_to_string(&dec).unwrap(), crate::testutil::FFMPEG_DEC_C);
    }

    #[test]
    fn test_missing_tree_lists_whole_manifest() {
        let dir = tempdir().unwrap();
        let err = SourceTree::inspect(&dir.path().join("nope"))
            .require_verified()
            .unwrap_err();
        let msg = err.to_string();
        for rel in REQUIRED_FILES {
            assert!(msg.contains(rel), "{} not named", rel);
        }
    }
}
