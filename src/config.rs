//! Project layout and run context.
//!
//! Every path the pipeline touches is derived from a single project root.
//! The vcpkg root can be overridden with `FFPREP_VCPKG_ROOT`, so an existing
//! checkout shared between projects is reused instead of cloned again.
//!
//! # Example
//!
//! ```rust
//! use ffprep::config::PrepConfig;
//!
//! let config = PrepConfig::new("/work/ffmpeg-node");
//! assert!(config.source_root.ends_with("lib_sources/ffmpeg"));
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::platform::PlatformProfile;
use crate::toolchain::{self, ToolchainEnv};

/// Environment variable overriding the vcpkg checkout location.
pub const VCPKG_ROOT_ENV: &str = "FFPREP_VCPKG_ROOT";

/// Resolved project paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepConfig {
    /// Project root; everything else hangs off this.
    pub project_root: PathBuf,
    /// vcpkg checkout.
    pub vcpkg_root: PathBuf,
    /// Parent of the canonical FFmpeg tree; archives are extracted here.
    pub lib_sources: PathBuf,
    /// Canonical FFmpeg source tree.
    pub source_root: PathBuf,
    /// Generated entry-point translation unit.
    pub entry_output: PathBuf,
}

impl PrepConfig {
    /// Layout rooted at `project_root`, ignoring the environment.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let lib_sources = project_root.join("lib_sources");
        Self {
            vcpkg_root: project_root.join("vcpkg"),
            source_root: lib_sources.join("ffmpeg"),
            entry_output: project_root.join("src").join("ffmpeg_crt.c"),
            lib_sources,
            project_root,
        }
    }

    /// Layout rooted at `project_root` with environment overrides applied.
    pub fn from_env(project_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(project_root);
        if let Ok(path) = env::var(VCPKG_ROOT_ENV) {
            if !path.is_empty() {
                config.vcpkg_root = PathBuf::from(path);
            }
        }
        config
    }

    /// vcpkg download cache.
    pub fn downloads_dir(&self) -> PathBuf {
        self.vcpkg_root.join("downloads")
    }

    /// Installed tree for a triplet.
    pub fn installed_dir(&self, triplet: &str) -> PathBuf {
        self.vcpkg_root.join("installed").join(triplet)
    }

    pub fn lib_dir(&self, triplet: &str) -> PathBuf {
        self.installed_dir(triplet).join("lib")
    }

    pub fn include_dir(&self, triplet: &str) -> PathBuf {
        self.installed_dir(triplet).join("include")
    }

    /// vcpkg's release build tree for FFmpeg, where the generated headers live.
    pub fn buildtree_dir(&self, triplet: &str) -> PathBuf {
        self.vcpkg_root
            .join("buildtrees")
            .join("ffmpeg")
            .join(format!("{}-rel", triplet))
    }
}

/// Everything a stage needs: paths, platform and toolchain.
#[derive(Debug, Clone)]
pub struct PrepContext {
    pub config: PrepConfig,
    pub platform: PlatformProfile,
    pub toolchain: ToolchainEnv,
}

impl PrepContext {
    /// Context for the running host.
    pub fn for_host(config: PrepConfig) -> Self {
        let platform = PlatformProfile::host();
        let toolchain = toolchain::detect(&platform);
        Self {
            config,
            platform,
            toolchain,
        }
    }

    /// Context with an explicit platform and no toolchain overrides.
    pub fn with_platform(config: PrepConfig, platform: PlatformProfile) -> Self {
        Self {
            config,
            platform,
            toolchain: ToolchainEnv::default(),
        }
    }

    pub fn triplet(&self) -> &'static str {
        self.platform.triplet
    }

    pub fn vcpkg_root(&self) -> &Path {
        &self.config.vcpkg_root
    }

    pub fn vcpkg_exe(&self) -> PathBuf {
        self.config.vcpkg_root.join(self.platform.tools.vcpkg)
    }

    pub fn bootstrap_script(&self) -> PathBuf {
        self.config
            .vcpkg_root
            .join(self.platform.tools.bootstrap_script)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.config.lib_dir(self.triplet())
    }

    pub fn include_dir(&self) -> PathBuf {
        self.config.include_dir(self.triplet())
    }

    pub fn buildtree_dir(&self) -> PathBuf {
        self.config.buildtree_dir(self.triplet())
    }
}
