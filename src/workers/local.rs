//! Local model-backed worker.
//!
//! Sends the task prompt to a completion backend and trusts the model to
//! have performed the tool actions it reports; each claimed action is then
//! confirmed against the real filesystem (a claimed write is read back)
//! without re-executing anything.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::core::errors::Result;
use crate::llm::CompletionClient;
use crate::planner::planner::TaskSpec;
use crate::workers::response::{self, ToolUse, WorkerResponse};
use crate::workers::tool_executor::ToolExecutor;
use crate::workers::worker::{Worker, WorkerResult};

/// Worker that executes tasks through a local completion backend.
pub struct LocalWorker {
    model: String,
    client: Arc<dyn CompletionClient>,
    verify_outputs: bool,
}

impl LocalWorker {
    pub fn new(model: impl Into<String>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            model: model.into(),
            client,
            verify_outputs: true,
        }
    }

    /// Skip the post-hoc filesystem verification pass. Useful for dry-run
    /// harnesses; production callers should leave verification on.
    pub fn without_verification(mut self) -> Self {
        self.verify_outputs = false;
        self
    }

    /// Confirm each claimed tool action against the filesystem, returning
    /// one trace line per action. Nothing is re-executed; bash commands in
    /// particular are only noted.
    async fn confirm_tool_usage(&self, tools_used: &[ToolUse], tools: &ToolExecutor) -> Vec<String> {
        let mut trace: Vec<String> = Vec::new();

        for usage in tools_used {
            match usage.tool.to_lowercase().as_str() {
                "write_file" => {
                    let Some(path) = usage.file.as_deref() else {
                        trace.push("✗ Warning: write_file entry missing path".to_string());
                        continue;
                    };
                    let read = tools.read_file(path).await;
                    if read.success {
                        trace.push(format!("✓ Verified: {path} exists and is readable"));
                    } else {
                        trace.push(format!("✗ Warning: {path} was claimed but doesn't exist"));
                    }
                }
                "read_file" => {
                    let Some(path) = usage.file.as_deref() else {
                        trace.push("✗ Warning: read_file entry missing path".to_string());
                        continue;
                    };
                    let read = tools.read_file(path).await;
                    if read.success {
                        trace.push(format!(
                            "✓ Verified: {path} read successfully ({} bytes)",
                            read.size
                        ));
                    } else {
                        trace.push(format!("✗ Warning: {path} cannot be read"));
                    }
                }
                "execute_bash" => {
                    // Re-running arbitrary commands is not safe; note it.
                    let command = usage.command.as_deref().unwrap_or("");
                    trace.push(format!(
                        "✓ Bash command reported: {}",
                        response::truncate_chars(command, 50)
                    ));
                }
                "list_files" => {
                    let directory = usage.directory.as_deref().unwrap_or(".");
                    let pattern = usage.pattern.as_deref().unwrap_or("*");
                    let listed = tools.list_files(directory, pattern).await;
                    if listed.success {
                        trace.push(format!(
                            "✓ Directory listing: {} files matching '{pattern}'",
                            listed.files.len()
                        ));
                    } else {
                        trace.push(format!("✗ Warning: cannot list {directory}"));
                    }
                }
                other => {
                    trace.push(format!("ℹ Unknown tool '{other}' reported, skipping"));
                }
            }
        }

        trace
    }

    fn build_result(&self, task: &TaskSpec, parsed: WorkerResponse, trace: Vec<String>) -> WorkerResult {
        let mut logs = parsed.logs.clone();
        if !trace.is_empty() {
            logs.push_str("\n\nTool verification:\n");
            logs.push_str(&trace.join("\n"));
        }

        WorkerResult {
            task_id: task.task_id.clone(),
            success: parsed.success,
            files_modified: parsed.files_modified.clone(),
            files_created: parsed.files_created.clone(),
            tests_run: parsed.test_runs(),
            verification_passed: parsed.verification_passed,
            errors: parsed.errors.clone(),
            logs,
        }
    }
}

#[async_trait]
impl Worker for LocalWorker {
    fn id(&self) -> &str {
        &self.model
    }

    async fn execute(&self, task: &TaskSpec, working_dir: &Path) -> Result<WorkerResult> {
        info!(task_id = %task.task_id, model = %self.model, "executing task with local worker");

        let parsed = match response::exchange(self.client.as_ref(), task).await {
            Ok(parsed) => parsed,
            Err(failure) => return Ok(failure.into_result(&task.task_id)),
        };

        let tools = ToolExecutor::new(working_dir);
        let trace = self.confirm_tool_usage(&parsed.tools_used, &tools).await;
        let mut result = self.build_result(task, parsed, trace);

        if self.verify_outputs {
            response::verify_files(&mut result, working_dir);
        }

        Ok(result)
    }
}
