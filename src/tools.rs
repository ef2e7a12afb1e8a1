//! The subprocess seam. Every external executable the pipeline drives goes
//! through [`ToolRunner`], so fallback ladders can be exercised with
//! scripted runners instead of the real tools.

use crate::error::{PipelineError, Result};
use std::ffi::{OsStr, OsString};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn stdin<S: Into<String>>(mut self, input: S) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// File name of the program, for messages.
    pub fn tool_name(&self) -> String {
        PathBuf::from(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok() -> Self {
        Self {
            status: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

pub trait ToolRunner {
    /// Runs the invocation to completion. A program that cannot be found is
    /// reported as [`PipelineError::ToolNotFound`]; a non-zero exit is not
    /// an error at this level.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        debug!(command = %invocation.command_line(), "spawning");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::ToolNotFound(invocation.tool_name()),
            _ => PipelineError::Io(e),
        })?;

        if let Some(ref input) = invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // The tool may exit before reading its prompt.
                match stdin.write_all(input.as_bytes()) {
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                    other => other?,
                }
            }
        }

        let output = child.wait_with_output()?;
        let result = ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(status = ?result.status, "{} finished", invocation.tool_name());
        Ok(result)
    }
}

/// Runs the invocation and turns a non-zero exit into
/// [`PipelineError::ToolFailed`].
pub fn run_checked(runner: &dyn ToolRunner, invocation: &Invocation) -> Result<ToolOutput> {
    let output = runner.run(invocation)?;
    if !output.success() {
        return Err(PipelineError::ToolFailed {
            tool: invocation.tool_name(),
            status: output.status,
            output: output.combined(),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_arguments() {
        let inv = Invocation::new("/opt/tools/apktool")
            .arg("d")
            .args(["-f", "-r"])
            .stdin("1\n");
        assert_eq!(inv.tool_name(), "apktool");
        assert!(inv.has_arg("-r"));
        assert!(!inv.has_arg("-s"));
        assert_eq!(inv.command_line(), "/opt/tools/apktool d -f -r");
        assert_eq!(inv.stdin.as_deref(), Some("1\n"));
    }

    #[test]
    fn missing_program_is_tool_not_found() {
        let inv = Invocation::new("apkrig-definitely-not-installed-7c1e");
        match ProcessRunner.run(&inv) {
            Err(PipelineError::ToolNotFound(name)) => {
                assert_eq!(name, "apkrig-definitely-not-installed-7c1e")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_fed_and_output_captured() {
        let inv = Invocation::new("sh")
            .args(["-c", "read choice; echo picked $choice; echo oops >&2; exit 3"])
            .stdin("1\n");
        let out = ProcessRunner.run(&inv).unwrap();
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout.trim(), "picked 1");
        assert_eq!(out.combined(), "picked 1\noops");
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_reports_failure() {
        let inv = Invocation::new("sh").args(["-c", "echo broken >&2; exit 2"]);
        match run_checked(&ProcessRunner, &inv) {
            Err(PipelineError::ToolFailed { tool, status, output }) => {
                assert_eq!(tool, "sh");
                assert_eq!(status, Some(2));
                assert_eq!(output, "broken");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
