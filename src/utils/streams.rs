// src/utils/streams.rs
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::defs::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildStream {
    Stdout,
    Stderr,
}

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stderr, or the exit status when the tool wrote nothing.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim_end();
        if stderr.is_empty() {
            format!("exited with {}", self.status)
        } else {
            stderr.to_string()
        }
    }
}


/// Reads a child's stdout or stderr to completion, line by line.
///
/// # Arguments
///
/// * `child` - Spawned child with the requested stream piped.
/// * `stream` - Which stream to drain.
///
/// # Returns
/// Vec of lines
pub async fn read_child_output_to_vec(child: &mut Child, stream: ChildStream) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    match stream {
        ChildStream::Stdout => {
            let stdout = child.stdout.take().ok_or_else(|| anyhow!("Child stdout was not piped"))?;
            let mut reader = BufReader::new(stdout).lines();
            while let Some(line) = reader.next_line().await? {
                lines.push(line);
            }
        }
        ChildStream::Stderr => {
            let stderr = child.stderr.take().ok_or_else(|| anyhow!("Child stderr was not piped"))?;
            let mut reader = BufReader::new(stderr).lines();
            while let Some(line) = reader.next_line().await? {
                lines.push(line);
            }
        }
    }
    child.wait().await?;
    Ok(lines)
}


/// Runs a command to completion, capturing stdout and stderr.
/// A missing executable is reported as ToolNotFound rather than a failed run.
///
/// # Arguments
///
/// * `tool` - Tag used in errors and logs.
/// * `program` - Executable to spawn.
/// * `args` - Command-line arguments.
///
/// # Returns
/// Result<ToolOutput, PipelineError>; a non-zero exit is still Ok and must be inspected.
pub async fn run_tool<S: AsRef<OsStr>>(tool: &str, program: &Path, args: &[S]) -> Result<ToolOutput, PipelineError> {
    debug!(
        "Running {} {}",
        program.display(),
        args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>().join(" ")
    );

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::ToolNotFound { tool: tool.to_string() },
            _ => PipelineError::ToolExecution {
                tool: tool.to_string(),
                error: format!("Failed to spawn {}: {}", program.display(), e),
            },
        })?;

    Ok(ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
