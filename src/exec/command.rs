// src/exec/command.rs

//! Running one external tool invocation.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::NanocasError;

/// Number of trailing stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// Failure of an external tool: it could not be spawned (`code == None`) or
/// it exited with a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub tool: String,
    pub code: Option<i32>,
    pub stderr: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with code {code}", self.tool)?,
            None => write!(f, "`{}` could not be run", self.tool)?,
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

impl From<ToolFailure> for NanocasError {
    fn from(f: ToolFailure) -> Self {
        NanocasError::ToolInvocation {
            tool: f.tool,
            code: f.code,
            stderr: f.stderr,
        }
    }
}

pub type ToolResult<T = ()> = std::result::Result<T, ToolFailure>;

/// A single invocation of an external program.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    log_to: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            log_to: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Send both stdout and stderr of the process to `path`.
    pub fn log_to(mut self, path: impl AsRef<Path>) -> Self {
        self.log_to = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `program sub-command` for log and error messages.
    fn label(&self) -> String {
        match self.args.first().and_then(|a| a.to_str()) {
            Some(first) if !first.starts_with('-') => format!("{} {first}", self.program),
            _ => self.program.clone(),
        }
    }

    fn failure(&self, code: Option<i32>, stderr: impl Into<String>) -> ToolFailure {
        ToolFailure {
            tool: self.label(),
            code,
            stderr: stderr.into(),
        }
    }
}

/// Run `cmd` to completion, discarding stdout.
pub async fn run_tool(cmd: &ToolCommand) -> ToolResult {
    execute(cmd, None).await
}

/// Run `cmd` to completion, handing each stdout line to `on_line` as it is
/// produced.
pub async fn stream_tool(
    cmd: &ToolCommand,
    on_line: &mut (dyn FnMut(&str) + Send),
) -> ToolResult {
    execute(cmd, Some(on_line)).await
}

async fn execute(
    cmd: &ToolCommand,
    on_stdout: Option<&mut (dyn FnMut(&str) + Send)>,
) -> ToolResult {
    let label = cmd.label();
    debug!(tool = %label, args = ?cmd.args, "starting external tool");

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match &cmd.log_to {
        Some(log) => {
            let file = File::create(log)
                .map_err(|e| cmd.failure(None, format!("creating log {}: {e}", log.display())))?;
            let err_file = file
                .try_clone()
                .map_err(|e| cmd.failure(None, format!("cloning log handle: {e}")))?;
            command.stdout(Stdio::from(file)).stderr(Stdio::from(err_file));
        }
        None => {
            let stdout = if on_stdout.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            };
            command.stdout(stdout).stderr(Stdio::piped());
        }
    }

    let mut child = command
        .spawn()
        .map_err(|e| cmd.failure(None, e.to_string()))?;

    // Always consume stderr so the pipe never fills; keep the tail for the
    // failure report.
    let stderr_task = child.stderr.take().map(|stderr| {
        let label = label.clone();
        tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(tool = %label, "stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
    });

    if let (Some(on_line), Some(stdout)) = (on_stdout, child.stdout.take()) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => on_line(&line),
                Ok(None) => break,
                Err(e) => {
                    let _ = child.kill().await;
                    return Err(cmd.failure(None, format!("reading stdout: {e}")));
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| cmd.failure(None, format!("waiting for process: {e}")))?;

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        info!(tool = %label, "external tool finished");
        Ok(())
    } else {
        warn!(tool = %label, exit_code = ?status.code(), "external tool failed");
        Err(cmd.failure(status.code(), stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_includes_subcommand_but_not_flags() {
        assert_eq!(ToolCommand::new("samtools").arg("sort").arg("-o").label(), "samtools sort");
        assert_eq!(ToolCommand::new("minimap2").arg("-a").label(), "minimap2");
    }

    #[tokio::test]
    async fn missing_program_is_a_failure_without_exit_code() {
        let cmd = ToolCommand::new("nanocas-definitely-not-installed");
        let failure = run_tool(&cmd).await.unwrap_err();
        assert_eq!(failure.code, None);
        assert_eq!(failure.tool, "nanocas-definitely-not-installed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_code_and_stderr() {
        let cmd = ToolCommand::new("sh").arg("-c").arg("echo broken >&2; exit 3");
        let failure = run_tool(&cmd).await.unwrap_err();
        assert_eq!(failure.code, Some(3));
        assert_eq!(failure.stderr, "broken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_lines_are_streamed() {
        let cmd = ToolCommand::new("sh").arg("-c").arg("printf 'a\\nb\\n'");
        let mut seen = Vec::new();
        stream_tool(&cmd, &mut |line: &str| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
