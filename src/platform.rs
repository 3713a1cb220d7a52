//! Host platform resolution.
//!
//! Maps the host OS and CPU architecture onto a vcpkg triplet and the
//! executable names the pipeline shells out to. The table is exhaustive over
//! the three supported families: Windows, macOS and "everything else", which
//! is treated as Linux.

use std::fmt;

/// Host operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    /// Any other OS. Built as Linux.
    Linux,
}

impl HostOs {
    /// Classify an OS name as reported by `std::env::consts::OS`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "windows" => HostOs::Windows,
            "macos" => HostOs::MacOs,
            _ => HostOs::Linux,
        }
    }

    /// True for hosts that run `.sh` scripts and need `chmod +x`.
    pub fn is_posix(&self) -> bool {
        !matches!(self, HostOs::Windows)
    }
}

/// Host CPU architecture, as far as triplet selection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostArch {
    Arm64,
    X64,
    Other,
}

impl HostArch {
    /// Classify an architecture name as reported by `std::env::consts::ARCH`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "aarch64" | "arm64" => HostArch::Arm64,
            "x86_64" | "x64" => HostArch::X64,
            _ => HostArch::Other,
        }
    }
}

/// Executable and script names used on a given host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNames {
    pub git: &'static str,
    pub vcpkg: &'static str,
    pub bootstrap_script: &'static str,
    pub c_compiler: &'static str,
}

/// Resolved platform description. Computed once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub os: HostOs,
    pub arch: HostArch,
    pub triplet: &'static str,
    pub tools: ToolNames,
    pub script_extension: &'static str,
}

impl PlatformProfile {
    /// Resolve the profile for the running host.
    pub fn host() -> Self {
        Self::resolve(
            HostOs::from_name(std::env::consts::OS),
            HostArch::from_name(std::env::consts::ARCH),
        )
    }

    /// Resolve the profile for an explicit OS/architecture pair.
    pub fn resolve(os: HostOs, arch: HostArch) -> Self {
        let triplet = match (os, arch) {
            (HostOs::Windows, _) => "x64-windows-static",
            (HostOs::MacOs, HostArch::Arm64) => "arm64-osx",
            (HostOs::MacOs, _) => "x64-osx",
            (HostOs::Linux, _) => "x64-linux",
        };

        let (tools, script_extension) = match os {
            HostOs::Windows => (
                ToolNames {
                    git: "git.exe",
                    vcpkg: "vcpkg.exe",
                    bootstrap_script: "bootstrap-vcpkg.bat",
                    c_compiler: "gcc",
                },
                "bat",
            ),
            HostOs::MacOs | HostOs::Linux => (
                ToolNames {
                    git: "git",
                    vcpkg: "vcpkg",
                    bootstrap_script: "bootstrap-vcpkg.sh",
                    c_compiler: "cc",
                },
                "sh",
            ),
        };

        Self {
            os,
            arch,
            triplet,
            tools,
            script_extension,
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?} ({})", self.os, self.arch, self.triplet)
    }
}
