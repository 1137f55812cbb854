//! Local file/shell tool execution for workers.
//!
//! A thin read/write/list/bash wrapper over the filesystem and process
//! spawner. Paths are always relative to a fixed working directory, and
//! writes verify themselves by reading back. Tool failures are reported as
//! failed outcomes, never as errors, so workers can fold them into result
//! logs without special-casing.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Outcome of reading a file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadOutcome {
    pub success: bool,
    pub content: String,
    pub size: usize,
    pub error: Option<String>,
}

/// Outcome of writing a file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteOutcome {
    pub success: bool,
    /// True when the read-back matched what was written.
    pub verified: bool,
    pub error: Option<String>,
}

/// Outcome of listing a directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListOutcome {
    pub success: bool,
    pub files: Vec<String>,
    pub error: Option<String>,
}

/// Outcome of running a shell command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BashOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

/// Executes tools (bash, file operations) for workers.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    working_dir: PathBuf,
}

impl ToolExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Read a file relative to the working directory.
    pub async fn read_file(&self, path: &str) -> ReadOutcome {
        let full_path = self.working_dir.join(path);
        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => ReadOutcome {
                success: true,
                size: content.len(),
                content,
                error: None,
            },
            Err(err) => ReadOutcome {
                success: false,
                content: String::new(),
                size: 0,
                error: Some(format!("Failed to read {path}: {err}")),
            },
        }
    }

    /// Write a file relative to the working directory, creating parent
    /// directories as needed, then verify by reading back.
    pub async fn write_file(&self, path: &str, content: &str) -> WriteOutcome {
        let full_path = self.working_dir.join(path);

        if let Some(parent) = full_path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return WriteOutcome {
                    success: false,
                    verified: false,
                    error: Some(format!("Failed to create directories for {path}: {err}")),
                };
            }
        }

        if let Err(err) = tokio::fs::write(&full_path, content).await {
            return WriteOutcome {
                success: false,
                verified: false,
                error: Some(format!("Failed to write {path}: {err}")),
            };
        }

        let verified = match tokio::fs::read_to_string(&full_path).await {
            Ok(read_back) => read_back == content,
            Err(_) => false,
        };
        WriteOutcome {
            success: true,
            verified,
            error: None,
        }
    }

    /// List files in a directory (non-recursive), matching a glob-style
    /// pattern supporting `*` and `?`.
    pub async fn list_files(&self, directory: &str, pattern: &str) -> ListOutcome {
        let dir_path = self.working_dir.join(directory);

        let mut entries = match tokio::fs::read_dir(&dir_path).await {
            Ok(entries) => entries,
            Err(err) => {
                return ListOutcome {
                    success: false,
                    files: Vec::new(),
                    error: Some(format!("Directory does not exist: {directory} ({err})")),
                }
            }
        };

        let mut files: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if matches_pattern(&name, pattern) {
                let relative = entry
                    .path()
                    .strip_prefix(&self.working_dir)
                    .map(|rel| rel.to_string_lossy().into_owned())
                    .unwrap_or(name);
                files.push(relative);
            }
        }
        files.sort();

        ListOutcome {
            success: true,
            files,
            error: None,
        }
    }

    /// Execute a bash command with a bounded timeout. A timed-out command
    /// yields a failed outcome with exit code -1, not an error; the child
    /// is killed when its handle drops.
    pub async fn execute_bash(&self, command: &str, timeout: Duration) -> BashOutput {
        info!(command = %command, "executing bash");

        let spawned = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %command, error = %err, "failed to spawn bash");
                return BashOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    returncode: -1,
                };
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let returncode = output.status.code().unwrap_or(-1);
                BashOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    returncode,
                }
            }
            Ok(Err(err)) => BashOutput {
                success: false,
                stdout: String::new(),
                stderr: err.to_string(),
                returncode: -1,
            },
            Err(_) => {
                warn!(command = %command, "bash command timed out");
                BashOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("Command timed out after {}s", timeout.as_secs_f64()),
                    returncode: -1,
                }
            }
        }
    }
}

/// Minimal glob match: `*` matches any run, `?` matches one character.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    fn matches(name: &[char], pattern: &[char]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                matches(name, &pattern[1..])
                    || (!name.is_empty() && matches(&name[1..], pattern))
            }
            (Some('?'), Some(_)) => matches(&name[1..], &pattern[1..]),
            (Some(p), Some(n)) if p == n => matches(&name[1..], &pattern[1..]),
            _ => false,
        }
    }
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    matches(&name, &pattern)
}
