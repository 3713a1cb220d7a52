//! Preflight checks for FFmpeg preparation.
//!
//! Validates the host BEFORE the long vcpkg install starts, and reports
//! which pipeline artifacts already exist.
//!
//! # Checks Performed
//!
//! - **Host tools**: git, a C compiler, and the tools vcpkg's bootstrap needs
//! - **Disk space**: enough room for the vcpkg checkout and FFmpeg build
//! - **Network**: the vcpkg repository is reachable
//! - **Cache status**: what earlier runs already produced
//!
//! # Usage
//!
//! ```rust,ignore
//! use ffprep::preflight::PreflightChecker;
//!
//! let report = PreflightChecker::new(&ctx).run_all().await;
//! report.print_summary();
//! if !report.is_ok() {
//!     std::process::exit(1);
//! }
//! ```

mod disk_space;
mod host_tools;
mod network;

pub use disk_space::check_disk_space;
pub use host_tools::check_host_tools;
pub use network::check_network;

use crate::config::PrepContext;
use crate::config_sync::GENERATED_HEADERS;
use crate::deps::VcpkgManager;
use crate::extract::{SourceAcquirer, SourceTree};
use crate::patch::entry;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Short label, e.g. `Disk space`
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// What was found
    pub message: String,
    /// How to fix a failure
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result with a fix.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// Host checks plus what earlier runs left on disk.
#[derive(Debug, Default)]
pub struct PreflightReport {
    /// All check results, in the order they ran
    pub checks: Vec<CheckResult>,
    /// Pipeline artifacts already present
    pub cache_status: CacheStatus,
}

impl PreflightReport {
    /// True if every check passed. Cache status never fails a report.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let status = if check.passed { "[OK]" } else { "[FAIL]" };
            println!("{} {}: {}", status, check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        println!("=== Cache Status ===\n");
        self.cache_status.print();

        println!();
        if self.is_ok() {
            println!(
                "All preflight checks passed ({}/{})",
                self.passed_count(),
                self.total_count()
            );
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.total_count()
            );
        }
    }
}

/// Which pipeline artifacts already exist on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// vcpkg checkout directory exists
    pub vcpkg_cloned: bool,
    /// vcpkg binary has been built
    pub vcpkg_bootstrapped: bool,
    /// avcodec is installed for the triplet
    pub toolkit_installed: bool,
    /// An `ffmpeg-*.tar.gz` is in the download cache
    pub archive_cached: bool,
    /// `lib_sources/ffmpeg` holds every required fftools file
    pub source_verified: bool,
    /// Both generated headers are in the source tree
    pub config_synced: bool,
    /// `src/ffmpeg_crt.c` defines `ffmpeg_entry`
    pub entry_generated: bool,
}

impl CacheStatus {
    /// Read-only look at the project. Logs nothing.
    pub fn inspect(ctx: &PrepContext) -> Self {
        let vcpkg = VcpkgManager::new(ctx);
        let source_root = &ctx.config.source_root;

        Self {
            vcpkg_cloned: vcpkg.is_cloned(),
            vcpkg_bootstrapped: vcpkg.is_bootstrapped(),
            toolkit_installed: vcpkg.is_installed(),
            archive_cached: SourceAcquirer::new(ctx).has_archive(),
            source_verified: SourceTree::inspect(source_root).is_verified(),
            config_synced: GENERATED_HEADERS
                .iter()
                .all(|name| source_root.join(name).is_file()),
            entry_generated: entry::record(&ctx.config).is_applied().unwrap_or(false),
        }
    }

    pub fn print(&self) {
        let status = |b: bool| if b { "[cached]" } else { "[missing]" };

        println!("{}  vcpkg checkout", status(self.vcpkg_cloned));
        println!("{}  vcpkg binary", status(self.vcpkg_bootstrapped));
        println!("{}  FFmpeg libraries", status(self.toolkit_installed));
        println!("{}  FFmpeg source archive", status(self.archive_cached));
        println!("{}  Source tree (verified)", status(self.source_verified));
        println!("{}  Generated config headers", status(self.config_synced));
        println!("{}  ffmpeg_entry source", status(self.entry_generated));
    }

    /// The command that makes the next bit of progress, if any.
    pub fn next_command(&self) -> Option<&'static str> {
        if !self.toolkit_installed {
            Some("ffprep install")
        } else if !self.source_verified {
            Some("ffprep source")
        } else if !self.config_synced || !self.entry_generated {
            Some("ffprep prepare --skip-install")
        } else {
            None
        }
    }
}

pub struct PreflightChecker<'a> {
    ctx: &'a PrepContext,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(ctx: &'a PrepContext) -> Self {
        Self { ctx }
    }

    pub async fn run_all(&self) -> PreflightReport {
        let mut report = PreflightReport::default();

        report.checks.extend(check_host_tools(self.ctx));
        report.checks.push(check_disk_space(self.ctx));
        report.checks.push(check_network(self.ctx).await);
        report.cache_status = CacheStatus::inspect(self.ctx);

        report
    }
}
