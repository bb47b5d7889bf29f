//! Shell-level command execution.
//!
//! All subprocess invocations go through this module, which provides a single
//! place where `Command::new` is constructed and output is captured. By
//! default a non-zero exit is not an error: callers inspect the captured
//! output, since backends want to pattern-match stderr before deciding
//! whether a failure is benign.

use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Captured result of one shell-level operation.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Join a program and its arguments into the display form used in errors.
pub fn command_line(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run a command, capturing stdout/stderr and the exit code.
///
/// Never fails on non-zero exit; only spawn/IO failures are errors. When
/// `input` is given it is written to the child's stdin before waiting.
pub fn run_shell(program: &str, args: &[String], input: Option<&str>) -> Result<ShellOutput> {
    let line = command_line(program, args);
    tracing::debug!(command = %line, "running shell command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| Error::ExecFailed {
        command: line.clone(),
        source: e,
    })?;

    if let Some(input) = input {
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(input.as_bytes()).map_err(|e| Error::ExecFailed {
                command: line.clone(),
                source: e,
            })?;
        }
    }

    let output = child.wait_with_output().map_err(|e| Error::ExecFailed {
        command: line.clone(),
        source: e,
    })?;

    let result = ShellOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code(),
    };
    tracing::debug!(command = %line, exit_code = ?result.exit_code, "shell command finished");
    Ok(result)
}

/// Like [`run_shell`], but a non-zero exit becomes [`Error::CommandFailed`].
pub fn run_shell_checked(
    program: &str,
    args: &[String],
    input: Option<&str>,
) -> Result<ShellOutput> {
    let output = run_shell(program, args, input)?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            command: command_line(program, args),
            stderr: output.stderr.trim().to_string(),
            exit_code: output.exit_code,
        })
    }
}
