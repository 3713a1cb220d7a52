//! Turn `fftools/ffmpeg.c` into a linkable translation unit.
//!
//! The host links the FFmpeg command line into its own binary and calls it
//! as `ffmpeg_entry(argc, argv)`. The generated file is the original source
//! with the `main` definition renamed and a provenance header on top.
//! The header records the SHA-256 of the source it was generated from, so
//! an unchanged source is not regenerated.

use std::path::Path;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::{in_tree, PatchOutcome, PatchRecord};
use crate::config::PrepConfig;
use crate::error::PrepError;
use crate::fsutil;

pub const ENTRY_PATCH_ID: &str = "entry-rewrite";
/// Source file, relative to the source root.
pub const ENTRY_SOURCE: &str = "fftools/ffmpeg.c";
pub const ENTRY_NAME: &str = "ffmpeg_entry";
pub const ENTRY_SIGNATURE: &str = "int ffmpeg_entry(int argc, char **argv)";

const SOURCE_HASH_LABEL: &str = "Source SHA-256: ";

/// `int main(int argc, char **argv)` with any whitespace between tokens.
static MAIN_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bint\s+main\s*\(\s*int\s+argc\s*,\s*char\s*\*\*\s*argv\s*\)")
        .expect("main signature pattern is valid")
});

/// Patch record for the generated output.
pub fn record(config: &PrepConfig) -> PatchRecord {
    PatchRecord::new(ENTRY_PATCH_ID, &config.entry_output, ENTRY_SIGNATURE)
}

pub fn has_main_signature(text: &str) -> bool {
    MAIN_SIGNATURE.is_match(text)
}

/// Rename every `main` definition. `None` if there is none.
pub fn rewrite_entry_point(text: &str) -> Option<String> {
    if !has_main_signature(text) {
        return None;
    }
    Some(MAIN_SIGNATURE.replace_all(text, ENTRY_SIGNATURE).into_owned())
}

pub fn provenance_header(source: &Path, source_sha256: &str, generated_at: &str) -> String {
    format!(
        "/*\n\
         \x20* This file is auto-generated from FFmpeg {ENTRY_SOURCE}\n\
         \x20* with main() renamed to {ENTRY_NAME}(). Do not edit.\n\
         \x20*\n\
         \x20* Original file: {}\n\
         \x20* {SOURCE_HASH_LABEL}{source_sha256}\n\
         \x20* Generated time: {generated_at}\n\
         \x20*/\n\n",
        source.display(),
    )
}

/// Source hash recorded in a generated file's header, if any.
pub fn recorded_source_hash(generated: &str) -> Option<&str> {
    generated
        .lines()
        .take_while(|line| !line.starts_with(" */"))
        .find_map(|line| line.split_once(SOURCE_HASH_LABEL).map(|(_, hash)| hash.trim()))
}

/// Generate `entry_output` from `fftools/ffmpeg.c` under `source_root`.
///
/// Skipped when the output already carries the renamed signature and was
/// generated from a source with the same hash.
pub fn generate_entry_source(config: &PrepConfig) -> Result<PatchOutcome> {
    let source = in_tree(&config.source_root, ENTRY_SOURCE);
    if !source.is_file() {
        return Err(PrepError::EntrySourceMissing { path: source }.into());
    }

    let original = fsutil::read_text(&source)?;
    let source_sha256 = fsutil::sha256_hex(original.as_bytes());

    let output = &config.entry_output;
    if output.is_file() {
        let existing = fsutil::read_text(output)?;
        if existing.contains(ENTRY_SIGNATURE)
            && recorded_source_hash(&existing) == Some(source_sha256.as_str())
        {
            info!("[SKIP] {} is up to date", output.display());
            return Ok(PatchOutcome::AlreadyApplied);
        }
    }

    let rewritten = rewrite_entry_point(&original)
        .ok_or_else(|| PrepError::EntryPointNotFound { path: source.clone() })?;

    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut generated = provenance_header(&source, &source_sha256, &generated_at);
    generated.push_str(&rewritten);

    fsutil::write_text(output, &generated)?;
    verify_generated(config)?;

    info!("generated {} from {}", output.display(), source.display());
    Ok(PatchOutcome::Applied)
}

/// The output must define `ffmpeg_entry` and no longer define `main`.
pub fn verify_generated(config: &PrepConfig) -> Result<()> {
    let record = record(config);
    record.verify_applied()?;
    if has_main_signature(&fsutil::read_text(&record.target)?) {
        return Err(PrepError::PostConditionFailed {
            path: record.target,
            expected: "no remaining main() definition".to_string(),
        }
        .into());
    }
    Ok(())
}
