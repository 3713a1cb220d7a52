//! Host tool validation.
//!
//! git clones vcpkg, a C compiler builds FFmpeg, and on POSIX hosts vcpkg's
//! bootstrap script needs a few archive and download tools of its own.

use super::CheckResult;
use crate::config::PrepContext;
use crate::process::which;

/// Tools vcpkg's POSIX bootstrap expects, with install suggestions.
const POSIX_BOOTSTRAP_TOOLS: &[(&str, &str, &str)] = &[
    ("curl", "Download vcpkg tool binaries", "sudo apt install curl"),
    ("zip", "vcpkg bootstrap", "sudo apt install zip"),
    ("unzip", "vcpkg bootstrap", "sudo apt install unzip"),
    ("tar", "vcpkg bootstrap", "sudo apt install tar"),
    ("pkg-config", "FFmpeg configure", "sudo apt install pkg-config"),
];

/// Check git, the C compiler and (on POSIX) vcpkg's bootstrap tools.
pub fn check_host_tools(ctx: &PrepContext) -> Vec<CheckResult> {
    let tools = &ctx.platform.tools;
    let mut results = vec![
        check_tool(tools.git, "Clone vcpkg", "Install git and make sure it is on PATH"),
        check_compiler(ctx),
    ];

    if ctx.platform.os.is_posix() {
        results.extend(
            POSIX_BOOTSTRAP_TOOLS
                .iter()
                .map(|(tool, purpose, install)| check_tool(tool, purpose, install)),
        );
    }

    results
}

fn check_tool(tool: &str, purpose: &str, install_cmd: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(
            format!("{} tool", tool),
            format!("Found at {} ({})", path, purpose),
        ),
        None => CheckResult::fail(
            format!("{} tool", tool),
            format!("Not found (needed for: {})", purpose),
            install_cmd,
        ),
    }
}

/// A MinGW directory found by toolchain detection counts as a compiler.
fn check_compiler(ctx: &PrepContext) -> CheckResult {
    let compiler = ctx
        .toolchain
        .cc
        .as_deref()
        .unwrap_or(ctx.platform.tools.c_compiler);

    if let Some(dir) = ctx.toolchain.path_prepend.first() {
        return CheckResult::pass(
            "C compiler",
            format!("{} from MinGW at {}", compiler, dir.display()),
        );
    }

    match which(compiler) {
        Some(path) => CheckResult::pass("C compiler", format!("{} at {}", compiler, path)),
        None => CheckResult::fail(
            "C compiler",
            format!("{} not found", compiler),
            if ctx.platform.os.is_posix() {
                "Install a C toolchain (build-essential, or Xcode command line tools)"
            } else {
                "Install MinGW-w64 (e.g. MSYS2) and add its bin directory to PATH"
            },
        ),
    }
}
