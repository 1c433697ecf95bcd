//! Subprocess helpers.
//!
//! [`Cmd`] is a small builder over [`std::process::Command`]: collect the
//! arguments, then either capture the output ([`Cmd::run`]) or let the child
//! share the terminal ([`Cmd::run_interactive`]). A non-zero exit is an
//! error unless [`Cmd::allow_fail`] is set.

use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

use crate::error::ImageError;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Command builder.
#[derive(Debug)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    removed_envs: Vec<String>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            removed_envs: Vec::new(),
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
        self.args.push(path.as_os_str().to_owned());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.removed_envs.push(key.into());
        self
    }

    /// Message reported in place of the generic failure text.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result of a failing command instead of an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human-readable command line.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for key in &self.removed_envs {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn check(&self, status: ExitStatus) -> Result<()> {
        if status.success() || self.allow_fail {
            return Ok(());
        }
        let err = ImageError::BuildFailed {
            command: self.display(),
            status: status.to_string(),
        };
        match &self.error_msg {
            Some(msg) => Err(anyhow::Error::new(err).context(msg.clone())),
            None => Err(err.into()),
        }
    }

    /// Run and capture stdout and stderr.
    pub fn run(self) -> Result<CommandResult> {
        debug!("Running {}", self.display());
        let output = self
            .command()
            .output()
            .with_context(|| format!("failed to start {}", self.display()))?;
        self.check(output.status)?;
        Ok(CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run with the terminal attached.
    pub fn run_interactive(self) -> Result<ExitStatus> {
        debug!("Running {}", self.display());
        let status = self
            .command()
            .status()
            .with_context(|| format!("failed to start {}", self.display()))?;
        self.check(status)?;
        Ok(status)
    }

    /// Run with stdout on the terminal, forwarding only stderr lines `keep` accepts.
    pub fn run_filtering_stderr(self, keep: impl Fn(&str) -> bool) -> Result<ExitStatus> {
        debug!("Running {}", self.display());
        let mut child = self
            .command()
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.display()))?;
        let forwarded = match child.stderr.take() {
            Some(stderr) => forward_lines(BufReader::new(stderr), &keep, &mut std::io::stderr()),
            None => Ok(()),
        };
        let status = child
            .wait()
            .with_context(|| format!("waiting for {}", self.display()))?;
        self.check(status)?;
        forwarded.with_context(|| format!("reading stderr of {}", self.display()))?;
        Ok(status)
    }

    /// Run with stdout and stderr appended to `log`.
    pub fn run_logged(self, log: &Path) -> Result<ExitStatus> {
        debug!("Running {} > {}", self.display(), log.display());
        let out = fs::File::create(log).with_context(|| format!("creating {}", log.display()))?;
        let err = out.try_clone()?;
        let status = self
            .command()
            .stdout(out)
            .stderr(err)
            .status()
            .with_context(|| format!("failed to start {}", self.display()))?;
        self.check(status)?;
        Ok(status)
    }
}

/// Copy the lines of `reader` that `keep` accepts to `out`.
///
/// Lines are decoded lossily; compiler output is not always UTF-8.
fn forward_lines<R: BufRead, W: Write>(
    mut reader: R,
    keep: impl Fn(&str) -> bool,
    out: &mut W,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if keep(line) {
            writeln!(out, "{}", line)?;
        }
    }
}

/// Full path of `tool` if it is an executable on `PATH`.
pub fn which(tool: &str) -> Option<String> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .flat_map(|dir| executable_names(tool).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
        .map(|p| p.to_string_lossy().into_owned())
}

pub fn exists(tool: &str) -> bool {
    which(tool).is_some()
}

/// Fail with [`ImageError::ToolNotFound`] unless `tool` is on `PATH`.
pub fn ensure_exists(tool: &str, purpose: &str) -> Result<String> {
    which(tool).ok_or_else(|| {
        ImageError::ToolNotFound {
            tool: tool.to_string(),
            purpose: purpose.to_string(),
        }
        .into()
    })
}

#[cfg(windows)]
fn executable_names(tool: &str) -> Vec<String> {
    vec![format!("{}.exe", tool), format!("{}.cmd", tool), tool.to_string()]
}

#[cfg(not(windows))]
fn executable_names(tool: &str) -> Vec<String> {
    vec![tool.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which_finds_shell() {
        assert!(exists("sh"));
        assert!(!exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_ensure_exists_reports_tool() {
        let err = ensure_exists("definitely_not_a_real_command_12345", "testing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::ToolNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output() {
        let result = Cmd::new("sh").args(["-c", "echo out; echo err >&2"]).run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_is_error_unless_allowed() {
        let err = Cmd::new("sh").args(["-c", "exit 3"]).run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::BuildFailed { .. })
        ));

        let result = Cmd::new("sh").args(["-c", "exit 3"]).allow_fail().run().unwrap();
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_env_and_removal() {
        let result = Cmd::new("sh")
            .args(["-c", "echo \"$A-${CLASSPATH:-none}\""])
            .env("A", "1")
            .env("CLASSPATH", "x")
            .env_remove("CLASSPATH")
            .run()
            .unwrap();
        // Explicit values are applied after removals.
        assert_eq!(result.stdout, "1-x\n");
    }

    #[test]
    fn test_forward_lines_tolerates_invalid_utf8() {
        let input: &[u8] = b"keep one\n\xff\xfe bad bytes\nXusage.txt noise\nkeep two";
        let mut out = Vec::new();
        forward_lines(input, |l| !l.contains("Xusage.txt"), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "keep one\n\u{fffd}\u{fffd} bad bytes\nkeep two\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_filtering_stderr_survives_invalid_utf8() {
        let status = Cmd::new("sh")
            .args(["-c", "printf '\\377\\n' >&2; echo done >&2; exit 0"])
            .run_filtering_stderr(|_| true)
            .unwrap();
        assert!(status.success());

        let err = Cmd::new("sh")
            .args(["-c", "printf '\\377\\n' >&2; exit 2"])
            .run_filtering_stderr(|_| true)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImageError>(),
            Some(ImageError::BuildFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_logged_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("build.log");
        Cmd::new("sh").args(["-c", "echo hello"]).run_logged(&log).unwrap();
        assert_eq!(fs::read_to_string(log).unwrap(), "hello\n");
    }
}
