//! C toolchain selection.
//!
//! On Windows the FFmpeg build wants a MinGW-w64 `gcc`. If none is on
//! `PATH`, a fixed set of common install locations is scanned. The result is
//! a [`ToolchainEnv`] value that [`crate::process::Cmd`] applies to child
//! processes only; the environment of this process is left alone.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::platform::{HostOs, PlatformProfile};
use crate::process;

/// Common MinGW-w64 `bin` directories.
const MINGW_CANDIDATES: &[&str] = &[
    r"C:\msys64\mingw64\bin",
    r"C:\msys64\mingw32\bin",
    r"C:\mingw64\bin",
    r"C:\mingw32\bin",
    r"C:\Program Files\mingw-w64\x86_64-8.1.0-posix-seh-rt_v6-rev0\mingw64\bin",
    r"C:\Program Files (x86)\mingw-w64\i686-8.1.0-posix-dwarf-rt_v6-rev0\mingw32\bin",
];

/// Environment additions for child processes that need a C toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainEnv {
    /// Directories to put in front of `PATH`.
    pub path_prepend: Vec<PathBuf>,
    /// Value for `CC`.
    pub cc: Option<String>,
    /// Value for `CXX`.
    pub cxx: Option<String>,
}

impl ToolchainEnv {
    /// True when nothing needs to change for child processes.
    pub fn is_empty(&self) -> bool {
        self.path_prepend.is_empty() && self.cc.is_none() && self.cxx.is_none()
    }

    /// Environment variables to set on a child, in order.
    pub fn vars(&self) -> Vec<(String, OsString)> {
        let mut vars = Vec::new();

        if !self.path_prepend.is_empty() {
            let mut dirs = self.path_prepend.clone();
            if let Some(existing) = std::env::var_os("PATH") {
                dirs.extend(std::env::split_paths(&existing));
            }
            match std::env::join_paths(dirs) {
                Ok(joined) => vars.push(("PATH".to_string(), joined)),
                Err(e) => warn!("cannot build PATH for toolchain: {}", e),
            }
        }
        if let Some(cc) = &self.cc {
            vars.push(("CC".to_string(), OsString::from(cc)));
        }
        if let Some(cxx) = &self.cxx {
            vars.push(("CXX".to_string(), OsString::from(cxx)));
        }

        vars
    }
}

/// Detect the toolchain environment for this host.
pub fn detect(profile: &PlatformProfile) -> ToolchainEnv {
    let candidates: Vec<PathBuf> = MINGW_CANDIDATES.iter().map(PathBuf::from).collect();
    detect_with(profile, process::exists("gcc"), &candidates)
}

/// Detection with the host lookups supplied by the caller.
pub fn detect_with(profile: &PlatformProfile, gcc_on_path: bool, candidates: &[PathBuf]) -> ToolchainEnv {
    if profile.os != HostOs::Windows || gcc_on_path {
        debug!("using default toolchain from PATH");
        return ToolchainEnv::default();
    }

    match find_mingw(candidates) {
        Some(bin) => {
            debug!("found MinGW at {}", bin.display());
            ToolchainEnv {
                path_prepend: vec![bin],
                cc: Some("gcc".to_string()),
                cxx: Some("g++".to_string()),
            }
        }
        None => {
            warn!(
                "no MinGW-w64 installation found; install MSYS2 and run 'pacman -S mingw-w64-x86_64-gcc'"
            );
            ToolchainEnv::default()
        }
    }
}

fn find_mingw(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|dir| has_gcc(dir))
        .cloned()
}

fn has_gcc(dir: &Path) -> bool {
    dir.join("gcc.exe").is_file()
}
