//! Network connectivity check.
//!
//! Verifies the vcpkg repository is reachable before anything is cloned.
//! Once vcpkg is bootstrapped the install still downloads FFmpeg, so the
//! check runs either way.

use std::time::Duration;

use super::CheckResult;
use crate::config::PrepContext;
use crate::deps::VCPKG_REMOTE;

const TIMEOUT: Duration = Duration::from_secs(15);

/// `git ls-remote` against the vcpkg remote, bounded by a timeout.
pub async fn check_network(ctx: &PrepContext) -> CheckResult {
    let mut cmd = tokio::process::Command::new(ctx.platform.tools.git);
    cmd.args(["ls-remote", "--heads", VCPKG_REMOTE, "master"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            CheckResult::pass("Network", format!("vcpkg remote reachable ({})", remote_host()))
        }
        Ok(Ok(_)) => CheckResult::fail(
            "Network",
            format!("vcpkg remote unreachable ({})", remote_host()),
            "Check your internet connection or proxy settings",
        ),
        Ok(Err(e)) => CheckResult::fail(
            "Network",
            format!("Failed to run git: {}", e),
            "Ensure git is installed and on PATH",
        ),
        Err(_) => CheckResult::fail(
            "Network",
            format!(
                "No answer from {} within {}s",
                remote_host(),
                TIMEOUT.as_secs()
            ),
            "Check your internet connection or try again later",
        ),
    }
}

/// Host part of the vcpkg remote, for display.
fn remote_host() -> &'static str {
    VCPKG_REMOTE
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(VCPKG_REMOTE)
}
