//! Remote-routed worker.
//!
//! Same prompt/parse contract as the local variant, but claimed tool
//! actions are actually executed through the [`ToolClient`] (remote
//! endpoint when configured, local fallback otherwise). File sets are
//! recomputed from the actions that really ran; the model's own claims
//! are not trusted.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::Result;
use crate::llm::CompletionClient;
use crate::planner::planner::TaskSpec;
use crate::workers::response::{self, ToolUse, WorkerResponse};
use crate::workers::tool_client::ToolClient;
use crate::workers::tool_executor::ToolExecutor;
use crate::workers::worker::{Worker, WorkerResult};

/// What executing the claimed tool actions produced.
#[derive(Debug, Default)]
struct ToolRun {
    trace: Vec<String>,
    errors: Vec<String>,
    files_created: BTreeSet<String>,
    files_modified: BTreeSet<String>,
}

/// Worker that routes tool actions through a tool-execution endpoint.
pub struct RemoteWorker {
    model: String,
    client: Arc<dyn CompletionClient>,
    base_url: Option<String>,
    verify_outputs: bool,
}

impl RemoteWorker {
    pub fn new(model: impl Into<String>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            model: model.into(),
            client,
            base_url: None,
            verify_outputs: true,
        }
    }

    /// Point tool execution at a remote endpoint. Without this, actions
    /// run against the local filesystem fallback.
    pub fn with_tool_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn without_verification(mut self) -> Self {
        self.verify_outputs = false;
        self
    }

    fn tool_client(&self, working_dir: &Path) -> ToolClient {
        let client = ToolClient::new(ToolExecutor::new(working_dir)).with_model(&self.model);
        match &self.base_url {
            Some(base_url) => client.with_base_url(base_url),
            None => client,
        }
    }

    /// Execute every claimed action, recording a trace line or an error
    /// per action and recomputing the touched-file sets.
    async fn run_tools(&self, tools_used: &[ToolUse], tools: &ToolClient) -> ToolRun {
        let mut run = ToolRun::default();

        for usage in tools_used {
            let tool = usage.tool.to_lowercase();
            if tool.is_empty() {
                continue;
            }

            match tool.as_str() {
                "write_file" => {
                    let Some(path) = usage.file.as_deref() else {
                        run.errors.push("write_file missing path".to_string());
                        continue;
                    };
                    let content = usage.content.as_deref().unwrap_or("");
                    let existed = tools.executor().working_dir().join(path).exists();
                    let outcome = tools.write_file(path, content).await;
                    if outcome.success {
                        run.trace.push(format!("✓ write_file -> {path}"));
                        if existed {
                            run.files_modified.insert(path.to_string());
                        } else {
                            run.files_created.insert(path.to_string());
                        }
                    } else {
                        run.errors.push(
                            outcome.error.unwrap_or_else(|| format!("write_file failed for {path}")),
                        );
                    }
                }
                "read_file" => {
                    let Some(path) = usage.file.as_deref() else {
                        run.errors.push("read_file missing path".to_string());
                        continue;
                    };
                    let outcome = tools.read_file(path).await;
                    if outcome.success {
                        run.trace
                            .push(format!("✓ read_file -> {path} ({} bytes)", outcome.output.len()));
                    } else {
                        run.errors.push(
                            outcome.error.unwrap_or_else(|| format!("read_file failed for {path}")),
                        );
                    }
                }
                "list_files" => {
                    let directory = usage
                        .directory
                        .as_deref()
                        .or(usage.file.as_deref())
                        .unwrap_or(".");
                    let pattern = usage.pattern.as_deref().unwrap_or("*");
                    let outcome = tools.list_files(directory, pattern).await;
                    if outcome.success {
                        let count = outcome.output.lines().filter(|line| !line.is_empty()).count();
                        run.trace.push(format!(
                            "✓ list_files -> {directory} ({count} items matching '{pattern}')"
                        ));
                    } else {
                        run.errors.push(
                            outcome
                                .error
                                .unwrap_or_else(|| format!("list_files failed for {directory}")),
                        );
                    }
                }
                "execute_bash" => {
                    let Some(command) = usage.command.as_deref().filter(|cmd| !cmd.is_empty())
                    else {
                        run.errors.push("execute_bash missing command".to_string());
                        continue;
                    };
                    let outcome = tools.execute_bash(command).await;
                    if outcome.success {
                        run.trace.push(format!(
                            "✓ execute_bash -> {}",
                            response::truncate_chars(command, 60)
                        ));
                        let stdout = outcome.output.trim();
                        if !stdout.is_empty() {
                            run.trace.push(stdout.to_string());
                        }
                    } else {
                        run.errors.push(
                            outcome
                                .error
                                .unwrap_or_else(|| format!("execute_bash failed for {command}")),
                        );
                    }
                }
                other => {
                    run.trace
                        .push(format!("ℹ Unsupported tool '{other}', skipping execution"));
                }
            }
        }

        run
    }

    fn build_result(&self, task: &TaskSpec, parsed: WorkerResponse, run: ToolRun) -> WorkerResult {
        let mut success = parsed.success;
        let mut errors = parsed.errors.clone();
        if !run.errors.is_empty() {
            warn!(task_id = %task.task_id, errors = ?run.errors, "tool execution encountered errors");
            errors.extend(run.errors);
            success = false;
        }

        let mut logs = parsed.logs.clone();
        if !run.trace.is_empty() {
            logs.push_str("\n\nTool execution:\n");
            logs.push_str(&run.trace.join("\n"));
        }

        WorkerResult {
            task_id: task.task_id.clone(),
            success,
            files_modified: run.files_modified.into_iter().collect(),
            files_created: run.files_created.into_iter().collect(),
            tests_run: parsed.test_runs(),
            verification_passed: parsed.verification_passed,
            errors,
            logs,
        }
    }
}

#[async_trait]
impl Worker for RemoteWorker {
    fn id(&self) -> &str {
        &self.model
    }

    async fn execute(&self, task: &TaskSpec, working_dir: &Path) -> Result<WorkerResult> {
        info!(task_id = %task.task_id, model = %self.model, "executing task with remote-routed worker");

        let parsed = match response::exchange(self.client.as_ref(), task).await {
            Ok(parsed) => parsed,
            Err(failure) => return Ok(failure.into_result(&task.task_id)),
        };

        let tools = self.tool_client(working_dir);
        let run = self.run_tools(&parsed.tools_used, &tools).await;
        let mut result = self.build_result(task, parsed, run);

        if self.verify_outputs {
            response::verify_files(&mut result, working_dir);
        }

        Ok(result)
    }
}
