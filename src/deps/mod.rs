//! vcpkg checkout and FFmpeg installation.
//!
//! Four operations, each of which checks for its own result first:
//!
//! 1. **acquire**: clone vcpkg unless the checkout directory exists
//! 2. **bootstrap**: run `bootstrap-vcpkg` unless the vcpkg binary exists
//! 3. **install**: `vcpkg install ffmpeg[...]:<triplet>` unless an avcodec
//!    library is already installed for the triplet
//! 4. **verify**: report which of the expected libraries are present
//!
//! # Usage
//!
//! ```rust,ignore
//! use ffprep::deps::VcpkgManager;
//!
//! let manager = VcpkgManager::new(&ctx);
//! let (outcome, toolkit) = manager.run().await?;
//! if !toolkit.is_complete() {
//!     println!("missing: {:?}", toolkit.missing);
//! }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::PrepContext;
use crate::error::PrepError;
use crate::fsutil;
use crate::platform::HostOs;
use crate::process::{self, Cmd};
use crate::Outcome;

/// Upstream vcpkg repository.
pub const VCPKG_REMOTE: &str = "https://github.com/microsoft/vcpkg.git";

/// vcpkg port name of the toolkit.
pub const PACKAGE_NAME: &str = "ffmpeg";

/// Features requested from the FFmpeg port.
pub const FFMPEG_FEATURES: &[&str] = &[
    "core",
    "gpl",
    "x264",
    "avcodec",
    "avformat",
    "avfilter",
    "avdevice",
    "swscale",
    "swresample",
];

/// Library whose presence means FFmpeg is already installed.
pub const INSTALL_MARKER: &str = "avcodec";

/// Libraries expected after installation (matched as filename substrings).
pub const REQUIRED_LIBS: &[&str] = &[
    "avcodec",
    "avformat",
    "avfilter",
    "avutil",
    "swscale",
    "swresample",
    "x264",
];

/// `ffmpeg[core,gpl,...]:<triplet>`
pub fn package_spec(triplet: &str) -> String {
    format!("{}[{}]:{}", PACKAGE_NAME, FFMPEG_FEATURES.join(","), triplet)
}

/// Result of checking the installed library directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledToolkit {
    pub triplet: String,
    pub lib_dir: PathBuf,
    pub present: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl InstalledToolkit {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Drives vcpkg for one [`PrepContext`].
pub struct VcpkgManager<'a> {
    ctx: &'a PrepContext,
}

impl<'a> VcpkgManager<'a> {
    pub fn new(ctx: &'a PrepContext) -> Self {
        Self { ctx }
    }

    pub fn is_cloned(&self) -> bool {
        self.ctx.vcpkg_root().exists()
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.ctx.vcpkg_exe().exists()
    }

    /// True if the triplet's lib directory holds an avcodec library.
    pub fn is_installed(&self) -> bool {
        list_files(&self.ctx.lib_dir())
            .map(|files| has_library(&files, INSTALL_MARKER))
            .unwrap_or(false)
    }

    /// Clone vcpkg unless the checkout already exists.
    pub async fn acquire(&self) -> Result<Outcome> {
        let root = self.ctx.vcpkg_root();
        if self.is_cloned() {
            info!("[SKIP] vcpkg checkout exists at {}", root.display());
            return Ok(Outcome::Skipped);
        }

        if let Some(parent) = root.parent() {
            fsutil::ensure_dir(parent)?;
        }

        info!("cloning vcpkg into {}", root.display());
        Cmd::new(self.ctx.platform.tools.git)
            .args(["clone", VCPKG_REMOTE])
            .arg_path(root)
            .error_msg("vcpkg clone failed; check network access and that git is installed")
            .run_async()
            .await?;

        Ok(Outcome::Done)
    }

    /// Build the vcpkg binary unless it already exists.
    pub async fn bootstrap(&self) -> Result<Outcome> {
        let exe = self.ctx.vcpkg_exe();
        if self.is_bootstrapped() {
            info!("[SKIP] vcpkg already bootstrapped ({})", exe.display());
            return Ok(Outcome::Skipped);
        }

        let script = self.ctx.bootstrap_script();
        if !script.exists() {
            return Err(PrepError::CommandFailed {
                command: script.display().to_string(),
                code: None,
                hint: format!(
                    "bootstrap script missing; remove {} and run 'ffprep install' to clone again",
                    self.ctx.vcpkg_root().display()
                ),
            }
            .into());
        }

        info!("bootstrapping vcpkg...");
        let cmd = match self.ctx.platform.os {
            HostOs::Windows => Cmd::new("cmd").arg("/C").arg_path(&script),
            HostOs::MacOs | HostOs::Linux => {
                process::make_executable(&script)?;
                Cmd::new(script.as_os_str())
            }
        };
        cmd.current_dir(self.ctx.vcpkg_root())
            .toolchain(&self.ctx.toolchain)
            .error_msg("vcpkg bootstrap failed")
            .run_async()
            .await?;

        Ok(Outcome::Done)
    }

    /// Install FFmpeg for the resolved triplet unless already installed.
    pub async fn install_toolkit(&self) -> Result<Outcome> {
        let triplet = self.ctx.triplet();
        if self.is_installed() {
            info!("[SKIP] FFmpeg already installed for {}", triplet);
            return Ok(Outcome::Skipped);
        }

        let spec = package_spec(triplet);
        info!("installing {} (this can take a long time)", spec);
        Cmd::new(self.ctx.vcpkg_exe().as_os_str())
            .arg("install")
            .arg(&spec)
            .current_dir(self.ctx.vcpkg_root())
            .toolchain(&self.ctx.toolchain)
            .error_msg(format!("vcpkg install {} failed", spec))
            .run_async()
            .await?;

        Ok(Outcome::Done)
    }

    /// Check the installed libraries.
    ///
    /// Missing libraries are a warning: optional codecs may legitimately be
    /// absent. A missing lib directory is fatal.
    pub fn verify(&self) -> Result<InstalledToolkit> {
        let lib_dir = self.ctx.lib_dir();
        if !lib_dir.is_dir() {
            return Err(PrepError::LibraryDirMissing { path: lib_dir }.into());
        }

        let files = list_files(&lib_dir)
            .with_context(|| format!("cannot list {}", lib_dir.display()))?;

        let (present, missing): (Vec<&str>, Vec<&str>) = REQUIRED_LIBS
            .iter()
            .copied()
            .partition(|lib| has_library(&files, lib));

        let toolkit = InstalledToolkit {
            triplet: self.ctx.triplet().to_string(),
            lib_dir,
            present: present.into_iter().map(String::from).collect(),
            missing: missing.into_iter().map(String::from).collect(),
        };

        if toolkit.is_complete() {
            info!("all {} required libraries present", REQUIRED_LIBS.len());
        } else {
            let missing: Vec<&str> = toolkit.missing.iter().map(String::as_str).collect();
            warn!(
                "some libraries may be missing: {} (continuing; check the vcpkg install if the build fails)",
                missing.join(", ")
            );
        }

        Ok(toolkit)
    }

    /// Acquire, bootstrap, install and verify.
    ///
    /// Skipped only if nothing had to be cloned, bootstrapped or installed.
    pub async fn run(&self) -> Result<(Outcome, InstalledToolkit)> {
        let cloned = self.acquire().await?;
        let bootstrapped = self.bootstrap().await?;
        let installed = self.install_toolkit().await?;
        let toolkit = self.verify()?;
        Ok((cloned.and(bootstrapped).and(installed), toolkit))
    }
}

fn list_files(dir: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn has_library(files: &[String], lib: &str) -> bool {
    files.iter().any(|f| f.contains(lib))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::linux_ctx;
    use tempfile::tempdir;

    fn install_libs(ctx: &PrepContext, names: &[&str]) {
        let lib_dir = ctx.lib_dir();
        fs::create_dir_all(&lib_dir).unwrap();
        for name in names {
            fs::write(lib_dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn test_package_spec() {
        assert_eq!(
            package_spec("x64-linux"),
            "ffmpeg[core,gpl,x264,avcodec,avformat,avfilter,avdevice,swscale,swresample]:x64-linux"
        );
    }

    #[tokio::test]
    async fn test_acquire_skips_existing_checkout() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();

        let manager = VcpkgManager::new(&ctx);
        assert_eq!(manager.acquire().await.unwrap(), Outcome::Skipped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_acquire_clone_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let mut ctx = linux_ctx(dir.path());
        // `false` accepts any arguments and exits 1, like a failed clone.
        ctx.platform.tools.git = "false";

        let manager = VcpkgManager::new(&ctx);
        let err = manager.acquire().await.unwrap_err();
        match err.downcast_ref::<PrepError>() {
            Some(PrepError::CommandFailed { command, code, hint }) => {
                assert!(command.starts_with("false clone "));
                assert_eq!(*code, Some(1));
                assert!(hint.contains("vcpkg clone failed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(crate::error::exit_code_for(&err), 1);
        assert!(!manager.is_cloned());

        // The full run stops at the clone and never reaches bootstrap.
        let err = manager.run().await.unwrap_err();
        assert_eq!(
            crate::error::kind_for(&err),
            Some(crate::error::ErrorKind::Acquisition)
        );
        assert!(!ctx.bootstrap_script().exists());
    }

    #[tokio::test]
    async fn test_bootstrap_skips_existing_binary() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();
        fs::write(ctx.vcpkg_exe(), b"").unwrap();

        assert_eq!(VcpkgManager::new(&ctx).bootstrap().await.unwrap(), Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_bootstrap_missing_script_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();

        let err = VcpkgManager::new(&ctx).bootstrap().await.unwrap_err();
        assert!(err.to_string().contains("bootstrap-vcpkg.sh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bootstrap_runs_script() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();
        // Not executable on purpose; bootstrap must chmod it.
        fs::write(ctx.bootstrap_script(), "#!/bin/sh\ntouch vcpkg\n").unwrap();

        let manager = VcpkgManager::new(&ctx);
        assert_eq!(manager.bootstrap().await.unwrap(), Outcome::Done);
        assert!(manager.is_bootstrapped());
        assert_eq!(manager.bootstrap().await.unwrap(), Outcome::Skipped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bootstrap_failure_propagates_exit_code() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();
        fs::write(ctx.bootstrap_script(), "#!/bin/sh\nexit 3\n").unwrap();

        let err = VcpkgManager::new(&ctx).bootstrap().await.unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_invokes_vcpkg_with_feature_list() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();
        fs::write(
            ctx.vcpkg_exe(),
            "#!/bin/sh\n\
             echo \"$@\" > args.txt\n\
             mkdir -p installed/x64-linux/lib\n\
             touch installed/x64-linux/lib/libavcodec.a\n",
        )
        .unwrap();
        process::make_executable(&ctx.vcpkg_exe()).unwrap();

        let manager = VcpkgManager::new(&ctx);
        assert_eq!(manager.install_toolkit().await.unwrap(), Outcome::Done);

        let args = fs::read_to_string(ctx.vcpkg_root().join("args.txt")).unwrap();
        assert_eq!(args.trim(), format!("install {}", package_spec("x64-linux")));
        assert!(manager.is_installed());
        assert_eq!(manager.install_toolkit().await.unwrap(), Outcome::Skipped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        fs::create_dir_all(ctx.vcpkg_root()).unwrap();
        fs::write(ctx.vcpkg_exe(), "#!/bin/sh\nexit 2\n").unwrap();
        process::make_executable(&ctx.vcpkg_exe()).unwrap();

        let err = VcpkgManager::new(&ctx).install_toolkit().await.unwrap_err();
        assert_eq!(crate::error::exit_code_for(&err), 2);
    }

    #[test]
    fn test_verify_reports_missing_without_failing() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        install_libs(&ctx, &["libavcodec.a", "libavformat.a", "libavutil.a"]);

        let toolkit = VcpkgManager::new(&ctx).verify().unwrap();
        assert!(!toolkit.is_complete());
        assert!(toolkit.present.contains("avcodec"));
        assert!(toolkit.missing.contains("x264"));
        assert!(toolkit.missing.contains("swscale"));
        assert_eq!(toolkit.present.len() + toolkit.missing.len(), REQUIRED_LIBS.len());
    }

    #[test]
    fn test_verify_complete() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        install_libs(
            &ctx,
            &[
                "libavcodec.a",
                "libavformat.a",
                "libavfilter.a",
                "libavutil.a",
                "libswscale.a",
                "libswresample.a",
                "libx264.a",
            ],
        );

        let toolkit = VcpkgManager::new(&ctx).verify().unwrap();
        assert!(toolkit.is_complete());
        assert_eq!(toolkit.triplet, "x64-linux");
    }

    #[test]
    fn test_verify_missing_lib_dir_is_fatal() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let err = VcpkgManager::new(&ctx).verify().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>(),
            Some(PrepError::LibraryDirMissing { .. })
        ));
    }

    #[test]
    fn test_is_installed_marker() {
        let dir = tempdir().unwrap();
        let ctx = linux_ctx(dir.path());
        let manager = VcpkgManager::new(&ctx);
        assert!(!manager.is_installed());
        install_libs(&ctx, &["avcodec.lib"]);
        assert!(manager.is_installed());
    }
}
