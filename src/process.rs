//! External command execution.
//!
//! [`Cmd`] is a small builder over `std::process::Command` and
//! `tokio::process::Command`. It records a human-readable command line for
//! logs, applies a [`ToolchainEnv`] to the child only, and turns a non-zero
//! exit into [`PrepError::CommandFailed`] unless the caller opts out with
//! [`Cmd::allow_fail`].
//!
//! ```rust,ignore
//! Cmd::new("git")
//!     .args(["clone", VCPKG_REMOTE])
//!     .arg_path(&root)
//!     .error_msg("vcpkg clone failed")
//!     .run_async()
//!     .await?;
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error::PrepError;
use crate::toolchain::ToolchainEnv;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code, `None` if the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, OsString)>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Apply toolchain environment additions to the child.
    pub fn toolchain(mut self, env: &ToolchainEnv) -> Self {
        self.envs.extend(env.vars());
        self
    }

    /// Message used when the command exits non-zero.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Do not treat a non-zero exit as an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Command line for display.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| {
                let s = part.to_string_lossy();
                if s.contains(' ') {
                    format!("\"{}\"", s)
                } else {
                    s.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn std_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run synchronously and capture stdout/stderr.
    pub fn run(self) -> Result<CommandResult> {
        debug!("running: {}", self.display());
        let output = self
            .std_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn {}", self.display()))?;

        let result = CommandResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.check(&result)?;
        Ok(result)
    }

    /// Run synchronously with stdio inherited so output streams to the terminal.
    pub fn run_interactive(self) -> Result<()> {
        info!("running: {}", self.display());
        let status = self
            .std_command()
            .status()
            .with_context(|| format!("failed to spawn {}", self.display()))?;
        self.check_status(status)
    }

    /// Spawn with stdio inherited and await completion.
    ///
    /// Used for the long-running steps (clone, bootstrap, vcpkg install).
    pub async fn run_async(self) -> Result<()> {
        info!("running: {}", self.display());
        let mut cmd = tokio::process::Command::from(self.std_command());
        cmd.kill_on_drop(true);
        let status = cmd
            .status()
            .await
            .with_context(|| format!("failed to spawn {}", self.display()))?;
        self.check_status(status)
    }

    fn check_status(&self, status: ExitStatus) -> Result<()> {
        let result = CommandResult {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
        };
        self.check(&result)
    }

    fn check(&self, result: &CommandResult) -> Result<()> {
        if result.success() || self.allow_fail {
            return Ok(());
        }

        let mut hint = self
            .error_msg
            .clone()
            .unwrap_or_else(|| "command exited unsuccessfully".to_string());
        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            hint.push_str("\n  ");
            hint.push_str(stderr);
        }

        Err(PrepError::CommandFailed {
            command: self.display(),
            code: result.code,
            hint,
        }
        .into())
    }
}

/// Locate a tool on `PATH`.
pub fn which(tool: &str) -> Option<String> {
    which::which(tool)
        .ok()
        .map(|path| path.display().to_string())
}

/// True if a tool is on `PATH`.
pub fn exists(tool: &str) -> bool {
    which(tool).is_some()
}

/// Mark a file as executable (`chmod +x`). No-op on non-Unix hosts.
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(path)
            .with_context(|| format!("cannot stat {}", path.display()))?
            .permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms)
            .with_context(|| format!("cannot chmod +x {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::exit_code_for;

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = Cmd::new("vcpkg")
            .arg("install")
            .arg_path(Path::new("/tmp/with space"));
        assert_eq!(cmd.display(), "vcpkg install \"/tmp/with space\"");
    }

    #[test]
    fn test_run_captures_stdout() {
        let result = Cmd::new("sh").args(["-c", "echo hello"]).run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_is_command_failed() {
        let err = Cmd::new("sh")
            .args(["-c", "echo broken >&2; exit 4"])
            .error_msg("script failed")
            .run()
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 4);
        let msg = err.to_string();
        assert!(msg.contains("script failed"));
        assert!(msg.contains("broken"));
    }

    #[test]
    fn test_allow_fail() {
        let result = Cmd::new("sh").args(["-c", "exit 2"]).allow_fail().run().unwrap();
        assert!(!result.success());
        assert_eq!(result.code, Some(2));
    }

    #[test]
    fn test_toolchain_env_reaches_child_only() {
        let env = ToolchainEnv {
            path_prepend: Vec::new(),
            cc: Some("my-cc".to_string()),
            cxx: None,
        };
        let result = Cmd::new("sh")
            .args(["-c", "echo $CC"])
            .toolchain(&env)
            .run()
            .unwrap();
        assert_eq!(result.stdout.trim(), "my-cc");
        assert_ne!(std::env::var("CC").ok().as_deref(), Some("my-cc"));
    }

    #[test]
    fn test_run_interactive_status() {
        Cmd::new("sh").args(["-c", "exit 0"]).run_interactive().unwrap();
        let err = Cmd::new("sh").args(["-c", "exit 5"]).run_interactive().unwrap_err();
        assert_eq!(exit_code_for(&err), 5);
    }

    #[tokio::test]
    async fn test_run_async_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        Cmd::new("sh")
            .args(["-c", "touch marker"])
            .current_dir(dir.path())
            .run_async()
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());

        let err = Cmd::new("sh").args(["-c", "exit 7"]).run_async().await.unwrap_err();
        assert_eq!(exit_code_for(&err), 7);
    }

    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        make_executable(&script).unwrap();
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert!(mode & 0o111 != 0);
    }

    #[test]
    fn test_which() {
        assert!(exists("sh"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }
}
