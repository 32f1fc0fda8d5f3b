//! External tool execution.
//!
//! Every ffmpeg/ffprobe/TTS invocation goes through [`ToolRunner`], which
//! spawns the process with `kill_on_drop` so a caller that abandons the
//! future (e.g. on a stage timeout) also reaps the child.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;

use crate::logging::JobLogger;

/// Errors from running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The program could not be started at all.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    Failed {
        tool: String,
        exit_code: i32,
        message: String,
    },
}

impl ToolError {
    pub fn failed(tool: impl Into<String>, exit_code: i32, message: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Runs external programs, echoing command lines and output into the job log.
#[derive(Clone, Default)]
pub struct ToolRunner {
    logger: Option<Arc<JobLogger>>,
    workdir: Option<PathBuf>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo commands and tool output into this job logger.
    pub fn with_logger(mut self, logger: Arc<JobLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run every command from this directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn logger(&self) -> Option<&Arc<JobLogger>> {
        self.logger.as_ref()
    }

    /// Run `program` with `args` and wait for it.
    ///
    /// A non-zero exit becomes [`ToolError::Failed`] carrying the last stderr
    /// lines; the job logger tail is shown in that case.
    pub async fn run<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<ToolOutput, ToolError> {
        let tool = tool_name(program);

        if let Some(logger) = &self.logger {
            logger.command(&format_command(program, args));
        }

        let mut command = Command::new(program);
        command.kill_on_drop(true);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let output = command.output().await.map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;
        let elapsed = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if let Some(logger) = &self.logger {
            for line in stdout.lines() {
                logger.tool_line(line, false);
            }
            for line in stderr.lines() {
                logger.tool_line(line, true);
            }
        }

        tracing::debug!(tool = %tool, exit_code, elapsed_ms = elapsed.as_millis() as u64, "Tool finished");

        if !output.status.success() {
            if let Some(logger) = &self.logger {
                logger.show_tail(&tool);
            }
            return Err(ToolError::failed(tool, exit_code, last_lines(&stderr, 5)));
        }

        Ok(ToolOutput {
            exit_code,
            stdout,
            stderr,
            elapsed,
        })
    }
}

impl std::fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRunner")
            .field("workdir", &self.workdir)
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

/// Short tool name for messages (`/usr/bin/ffmpeg` -> `ffmpeg`).
fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string())
}

/// Shell-like rendering of a command line for the log.
pub fn format_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(&arg);
            line.push('"');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_command_with_quoting() {
        let line = format_command("ffmpeg", &["-i", "my slide.png", "-y"]);
        assert_eq!(line, "ffmpeg -i \"my slide.png\" -y");
    }

    #[test]
    fn tool_name_strips_directories() {
        assert_eq!(tool_name("/usr/local/bin/ffprobe"), "ffprobe");
        assert_eq!(tool_name("ffmpeg"), "ffmpeg");
    }

    #[test]
    fn last_lines_keeps_tail() {
        let text = "a\n\nb\nc\nd\n";
        assert_eq!(last_lines(text, 2), "c\nd");
        assert_eq!(last_lines("", 3), "");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = ToolRunner::new();
        let result = runner
            .run("reelcast-definitely-not-a-real-tool", &["--version"])
            .await;
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
    }
}
