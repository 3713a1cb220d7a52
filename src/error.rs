//! Error taxonomy for the preparation pipeline.
//!
//! Most code returns `anyhow::Result` and adds context as it goes. The
//! variants here are the failures the orchestrator has to recognise: they
//! carry the artifact that is missing and, through [`PrepError::kind`], the
//! class of failure.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Broad class of a fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Something that should have been downloaded, cloned or bootstrapped is missing.
    Acquisition,
    /// An artifact exists but is structurally incomplete.
    Verification,
    /// A source patch could not be applied or did not verify.
    Transformation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Acquisition => "acquisition",
            ErrorKind::Verification => "verification",
            ErrorKind::Transformation => "transformation",
        })
    }
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error(
        "vcpkg download cache not found: {}\n  Run 'ffprep install' first so vcpkg fetches the FFmpeg sources",
        .path.display()
    )]
    DownloadCacheMissing { path: PathBuf },

    #[error(
        "no FFmpeg source archive (ffmpeg-*.tar.gz) in {}\n  Run 'ffprep install' first so vcpkg fetches the FFmpeg sources",
        .dir.display()
    )]
    ArchiveNotFound { dir: PathBuf },

    #[error("no directory starting with '{prefix}' found in {} after extraction", .dir.display())]
    ExtractedDirNotFound { dir: PathBuf, prefix: String },

    #[error("{command} failed{}: {hint}", exit_suffix(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        hint: String,
    },

    #[error(
        "FFmpeg source tree at {} is incomplete, missing:\n  {}",
        .root.display(),
        .missing.join("\n  ")
    )]
    ManifestIncomplete { root: PathBuf, missing: Vec<String> },

    #[error("vcpkg library directory not found: {}\n  Run 'ffprep install' to (re)install FFmpeg", .path.display())]
    LibraryDirMissing { path: PathBuf },

    #[error("entry-point source not found: {}\n  Run 'ffprep source' to re-extract FFmpeg", .path.display())]
    EntrySourceMissing { path: PathBuf },

    #[error(
        "no `int main(int argc, char **argv)` signature in {}\n  The FFmpeg source layout has changed; the entry-point rewrite needs updating",
        .path.display()
    )]
    EntryPointNotFound { path: PathBuf },

    #[error("post-condition failed for {}: expected to find `{expected}`", .path.display())]
    PostConditionFailed { path: PathBuf, expected: String },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => " (terminated by signal)".to_string(),
    }
}

impl PrepError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrepError::DownloadCacheMissing { .. }
            | PrepError::ArchiveNotFound { .. }
            | PrepError::ExtractedDirNotFound { .. }
            | PrepError::CommandFailed { .. } => ErrorKind::Acquisition,
            PrepError::ManifestIncomplete { .. } | PrepError::LibraryDirMissing { .. } => {
                ErrorKind::Verification
            }
            PrepError::EntrySourceMissing { .. }
            | PrepError::EntryPointNotFound { .. }
            | PrepError::PostConditionFailed { .. } => ErrorKind::Transformation,
        }
    }

    /// Process exit status to report for this error.
    ///
    /// A failed child process propagates its own non-zero exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            PrepError::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

fn find_prep_error(err: &anyhow::Error) -> Option<&PrepError> {
    err.chain().find_map(|cause| cause.downcast_ref::<PrepError>())
}

/// Exit status for an arbitrary error, looking through its context chain.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    find_prep_error(err).map(PrepError::exit_code).unwrap_or(1)
}

/// Class of an arbitrary error; `None` for failures outside the taxonomy
/// such as plain I/O errors.
pub fn kind_for(err: &anyhow::Error) -> Option<ErrorKind> {
    find_prep_error(err).map(PrepError::kind)
}
