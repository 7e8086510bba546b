//! External process execution.
//!
//! Every program the installer shells out to (podman, systemctl, bash,
//! python3) goes through [`CommandRunner`] so stages can be exercised
//! against a recording fake instead of the real host.

use crate::error::{InstallError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// A single program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Capture stdout/stderr instead of streaming them to the terminal
    pub capture: bool,
}

impl Invocation {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            capture: true,
        }
    }

    /// Run with the given working directory.
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Stream output to the operator's terminal (used for image builds).
    pub fn streaming(mut self) -> Self {
        self.capture = false;
        self
    }

    /// Render as a shell-like line for logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Short failure description: exit code plus the last stderr line.
    pub fn failure_reason(&self) -> String {
        let code = self
            .code
            .map(|c| format!("exit status {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => format!("{}: {}", code, line.trim()),
            None => code,
        }
    }
}

pub trait CommandRunner {
    /// Locate a program on the search path.
    fn resolve(&self, program: &str) -> Option<PathBuf>;

    /// Run a program to completion. A non-zero exit is reported through
    /// `CommandOutput::success`, not as an error; errors mean the program
    /// could not be spawned or was killed on timeout.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs real processes on the host.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// `None` waits forever on every child.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdin(Stdio::null());

        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        if invocation.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        tracing::debug!(command = %invocation.display(), "spawning");

        let mut child = cmd.spawn().map_err(|e| {
            InstallError::Command(format!("Failed to run {}: {}", invocation.program, e))
        })?;

        let Some(limit) = self.timeout else {
            let output = child.wait_with_output()?;
            return Ok(CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        };

        // Drain the pipes while waiting so a chatty child never blocks on write.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                child.kill().ok();
                child.wait().ok();
                return Err(InstallError::CommandTimeout {
                    program: invocation.program.clone(),
                    secs: limit.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).ok();
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("podman", &["build", "--no-cache", "."]);
        assert_eq!(inv.display(), "podman build --no-cache .");
        assert!(inv.capture);
        assert!(!inv.clone().streaming().capture);
    }

    #[test]
    fn test_failure_reason_uses_last_stderr_line() {
        let out = CommandOutput {
            success: false,
            code: Some(125),
            stdout: String::new(),
            stderr: "first\nError: image not known\n\n".to_string(),
        };
        assert_eq!(out.failure_reason(), "exit status 125: Error: image not known");
    }

    #[test]
    fn test_failure_reason_signal() {
        let out = CommandOutput::default();
        assert_eq!(out.failure_reason(), "terminated by signal");
    }

    #[test]
    fn test_system_runner_captures_output() {
        let runner = SystemRunner::new(None);
        let out = runner
            .run(&Invocation::new("sh", &["-c", "echo hello; exit 3"]))
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_system_runner_times_out() {
        let runner = SystemRunner::new(Some(Duration::from_millis(200)));
        let result = runner.run(&Invocation::new("sleep", &["5"]));
        assert!(matches!(result, Err(InstallError::CommandTimeout { .. })));
    }

    const LARGE_OUTPUT: &str = "head -c 200000 /dev/zero | tr '\\0' a";

    #[test]
    fn test_system_runner_captures_output_larger_than_pipe_buffer() {
        let out = SystemRunner::new(None)
            .run(&Invocation::new("sh", &["-c", LARGE_OUTPUT]))
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.len(), 200_000);
        assert!(out.stdout.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_system_runner_large_output_with_timeout() {
        let out = SystemRunner::new(Some(Duration::from_secs(30)))
            .run(&Invocation::new("sh", &["-c", LARGE_OUTPUT]))
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.len(), 200_000);
    }

    #[test]
    fn test_system_runner_missing_program() {
        let runner = SystemRunner::new(None);
        assert!(runner.resolve("definitely-not-a-real-program-xyz").is_none());
        let result = runner.run(&Invocation::new("definitely-not-a-real-program-xyz", &[]));
        assert!(matches!(result, Err(InstallError::Command(_))));
    }
}
