//! Running commands in an interactive build shell.
//!
//! The Windows toolchain only works inside the SDK's configured `cmd.exe`.
//! The shell is driven through its stdin: echo a start token, run the command
//! followed by an end token, then query the exit status with
//! `echo ERRXXX%errorlevel%`.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

use crate::config::Settings;

pub const START_TOKEN: &str = "RUNINDEBUGSHELL_STARTSEQUENCE";
pub const END_TOKEN: &str = "RUNINDEBUGSHELL_ENDSEQUENCE";
const STATUS_PREFIX: &str = "ERRXXX";

const DEFAULT_WIN_SDK: &str = "C:\\Program Files\\Microsoft SDKs\\Windows\\v7.1\\";

/// A command to run in the shell.
#[derive(Debug)]
pub struct ShellCommand {
    pub command: String,
    pub working_dir: String,
    /// Success is decided by this matching some output line instead of the exit status.
    pub success: Option<Regex>,
    /// Lines to send whenever an output line matches.
    pub responses: Vec<(Regex, String)>,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            success: None,
            responses: Vec::new(),
        }
    }

    pub fn success_when(mut self, pattern: Regex) -> Self {
        self.success = Some(pattern);
        self
    }
}

/// Drive one command through a shell's `output` and `input`.
///
/// Every output line is copied to `log` when given. Returns whether the
/// command succeeded.
pub fn drive<R: BufRead, W: Write>(
    output: R,
    input: &mut W,
    cmd: &ShellCommand,
    mut log: Option<&mut dyn Write>,
) -> Result<bool> {
    let mut ok = false;
    writeln!(input, "echo {}", START_TOKEN)?;
    input.flush()?;

    for line in output.lines() {
        let raw = line?;
        if let Some(log) = log.as_deref_mut() {
            writeln!(log, "{}", raw)?;
        }
        let line = raw.trim();
        info!("{}", line);

        if line == START_TOKEN {
            writeln!(
                input,
                "cd /D {} & {} & echo {}",
                cmd.working_dir, cmd.command, END_TOKEN
            )?;
        }
        for (pattern, response) in &cmd.responses {
            if pattern.is_match(line) {
                writeln!(input, "{}", response)?;
            }
        }
        if let Some(success) = &cmd.success {
            if success.is_match(line) {
                ok = true;
            }
        }
        if line == END_TOKEN {
            if cmd.success.is_none() {
                writeln!(input, "echo {}%errorlevel%", STATUS_PREFIX)?;
            } else {
                break;
            }
        }
        if let Some(code) = line.strip_prefix(STATUS_PREFIX) {
            ok = code == "0";
            break;
        }
        input.flush()?;
    }
    writeln!(input, "exit")?;
    input.flush()?;
    Ok(ok)
}

/// SetEnv script of the configured Windows SDK.
pub fn sdk_setenv(settings: &Settings) -> Result<PathBuf> {
    let sdk = PathBuf::from(settings.var("WIN_SDK").unwrap_or(DEFAULT_WIN_SDK));
    if !sdk.exists() {
        bail!("Could not find Windows SDK : '{}' does not exist", sdk.display());
    }
    let setenv = sdk.join("Bin").join("SetEnv.cmd");
    if !setenv.exists() {
        bail!(
            "Invalid Windows SDK path ({}) : could not find Bin/SetEnv.cmd \
             (you can use the WIN_SDK environment variable to specify an other path)",
            sdk.display()
        );
    }
    Ok(setenv)
}

/// Run `cmd` in a fresh SDK shell, logging its output to `log_file`.
pub fn run(settings: &Settings, cmd: &ShellCommand, log_file: Option<&Path>) -> Result<bool> {
    let setenv = sdk_setenv(settings)?;
    let mut child = Command::new("cmd.exe")
        .args(["/E:ON", "/V:ON", "/K"])
        .arg(&setenv)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start cmd.exe")?;

    let mut stdin = child.stdin.take().context("shell stdin unavailable")?;
    let stdout = child.stdout.take().context("shell stdout unavailable")?;
    let mut log = match log_file {
        Some(path) => {
            Some(fs::File::create(path).with_context(|| format!("creating {}", path.display()))?)
        }
        None => None,
    };

    let ok = drive(
        BufReader::new(stdout),
        &mut stdin,
        cmd,
        log.as_mut().map(|f| f as &mut dyn Write),
    )?;
    drop(stdin);
    child.wait()?;
    Ok(ok)
}
