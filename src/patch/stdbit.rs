//! `<stdbit.h>` compatibility for toolchains without C23 headers.
//!
//! Newer fftools include `<stdbit.h>` unconditionally. The include is
//! replaced by a block that keeps it when `HAVE_STDBIT_H` is set and
//! otherwise defines the two functions fftools uses.

use anyhow::Result;
use tracing::{info, warn};

use super::{in_tree, PatchOutcome, PatchRecord};
use crate::fsutil;

pub const STDBIT_PATCH_ID: &str = "stdbit-compat";
/// File patched, relative to the source root.
pub const STDBIT_TARGET: &str = "fftools/ffmpeg_dec.c";
pub const STDBIT_MARKER: &str = "/* stdbit.h compatibility patch */";
pub const STDBIT_INCLUDE: &str = "#include <stdbit.h>";

// Only valid for `unsigned int` arguments.
const STDBIT_FALLBACK: &str = r#"/* stdbit.h compatibility patch */
#if HAVE_STDBIT_H
#include <stdbit.h>
#else
static inline unsigned int stdc_count_ones(unsigned int x)
{
    unsigned int n = 0;
    while (x) {
        n += x & 1u;
        x >>= 1;
    }
    return n;
}

static inline unsigned int stdc_trailing_zeros(unsigned int x)
{
    unsigned int n = 0;
    if (x == 0)
        return sizeof(x) * 8;
    while ((x & 1u) == 0) {
        n++;
        x >>= 1;
    }
    return n;
}
#endif"#;

/// Patch record for a given source root.
pub fn record(source_root: &std::path::Path) -> PatchRecord {
    PatchRecord::new(STDBIT_PATCH_ID, in_tree(source_root, STDBIT_TARGET), STDBIT_MARKER)
}

/// Replace the first `<stdbit.h>` include. `None` if there is none.
pub fn shim_text(text: &str) -> Option<String> {
    if text.contains(STDBIT_INCLUDE) {
        Some(text.replacen(STDBIT_INCLUDE, STDBIT_FALLBACK, 1))
    } else {
        None
    }
}

/// Apply the shim to `fftools/ffmpeg_dec.c` under `source_root`.
pub fn apply_compat_shim(source_root: &std::path::Path) -> Result<PatchOutcome> {
    let record = record(source_root);

    if !record.target.is_file() {
        warn!("{} not found, skipping stdbit.h shim", record.target.display());
        return Ok(PatchOutcome::TargetAbsent);
    }

    let text = fsutil::read_text(&record.target)?;
    if text.contains(STDBIT_MARKER) {
        info!("[SKIP] stdbit.h shim already applied");
        return Ok(PatchOutcome::AlreadyApplied);
    }

    let patched = match shim_text(&text) {
        Some(patched) => patched,
        None => {
            info!("[SKIP] {} does not include <stdbit.h>", STDBIT_TARGET);
            return Ok(PatchOutcome::NotApplicable);
        }
    };

    fsutil::write_text(&record.target, &patched)?;
    record.verify_applied()?;
    info!("applied stdbit.h shim to {}", record.target.display());
    Ok(PatchOutcome::Applied)
}
