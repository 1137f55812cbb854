//! Remote tool routing with local fallback.
//!
//! When a tool endpoint base URL is configured, claimed tool actions are
//! proxied to `POST {base}/tool/execute`; when it is not, or the endpoint
//! cannot be reached, the action runs through the local [`ToolExecutor`].
//! Workers see one standardized [`ToolOutcome`] either way.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::errors::{ForemanError, Result};
use crate::workers::tool_executor::ToolExecutor;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BASH_TIMEOUT: Duration = Duration::from_secs(60);

/// Standardized result for tool executions, local or remote.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolOutcome {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct RemoteToolRequest<'a> {
    tool: &'a str,
    provider: &'a str,
    model: &'a str,
    args: Value,
    #[serde(rename = "sessionID")]
    session_id: &'a str,
    agent: &'a str,
    extra: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteToolResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: RemoteToolResult,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteToolResult {
    #[serde(default)]
    output: String,
    #[serde(default)]
    #[allow(dead_code)]
    metadata: Value,
}

/// Executes tool actions on behalf of a remote-routed worker.
pub struct ToolClient {
    executor: ToolExecutor,
    http: reqwest::Client,
    base_url: Option<String>,
    session_id: String,
    provider: String,
    model: String,
    agent: String,
    request_timeout: Duration,
}

impl ToolClient {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            http: reqwest::Client::new(),
            base_url: None,
            session_id: Uuid::new_v4().to_string(),
            provider: "ollama".to_string(),
            model: "gpt-oss:20b".to_string(),
            agent: "foreman-worker".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Route tool actions to a remote endpoint instead of executing them
    /// locally. Without a base URL every action falls back to the local
    /// executor.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub async fn write_file(&self, path: &str, content: &str) -> ToolOutcome {
        let args = json!({ "filePath": path, "content": content });
        match self.invoke_remote("write", args).await {
            Some(outcome) => outcome,
            None => {
                let written = self.executor.write_file(path, content).await;
                if written.success {
                    ToolOutcome::ok(format!("wrote {path}"))
                } else {
                    ToolOutcome::failed(
                        written.error.unwrap_or_else(|| format!("write_file failed for {path}")),
                    )
                }
            }
        }
    }

    pub async fn read_file(&self, path: &str) -> ToolOutcome {
        let args = json!({ "filePath": path });
        match self.invoke_remote("read", args).await {
            Some(outcome) => outcome,
            None => {
                let read = self.executor.read_file(path).await;
                if read.success {
                    ToolOutcome::ok(read.content)
                } else {
                    ToolOutcome::failed(
                        read.error.unwrap_or_else(|| format!("read_file failed for {path}")),
                    )
                }
            }
        }
    }

    pub async fn list_files(&self, directory: &str, pattern: &str) -> ToolOutcome {
        let args = json!({ "path": directory, "pattern": pattern });
        match self.invoke_remote("ls", args).await {
            Some(outcome) => outcome,
            None => {
                let listed = self.executor.list_files(directory, pattern).await;
                if listed.success {
                    ToolOutcome::ok(listed.files.join("\n"))
                } else {
                    ToolOutcome::failed(
                        listed
                            .error
                            .unwrap_or_else(|| format!("list_files failed for {directory}")),
                    )
                }
            }
        }
    }

    pub async fn execute_bash(&self, command: &str) -> ToolOutcome {
        let args = json!({ "command": command });
        match self.invoke_remote("bash", args).await {
            Some(outcome) => outcome,
            None => {
                let output = self.executor.execute_bash(command, DEFAULT_BASH_TIMEOUT).await;
                if output.success {
                    ToolOutcome::ok(output.stdout)
                } else {
                    let detail = if output.stderr.is_empty() {
                        format!("exit code {}", output.returncode)
                    } else {
                        output.stderr
                    };
                    ToolOutcome::failed(format!("execute_bash failed: {detail}"))
                }
            }
        }
    }

    /// Try the remote endpoint; `None` means "fall back to local", either
    /// because no endpoint is configured or because it was unreachable.
    async fn invoke_remote(&self, tool: &str, args: Value) -> Option<ToolOutcome> {
        let base_url = self.base_url.as_deref()?;
        match self.post_tool(base_url, tool, args).await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(tool = tool, error = %err, "remote tool endpoint unavailable, falling back to local executor");
                None
            }
        }
    }

    async fn post_tool(&self, base_url: &str, tool: &str, args: Value) -> Result<ToolOutcome> {
        let url = format!("{}/tool/execute", base_url.trim_end_matches('/'));
        let directory = self.executor.working_dir().to_string_lossy().into_owned();
        let body = RemoteToolRequest {
            tool,
            provider: &self.provider,
            model: &self.model,
            args,
            session_id: &self.session_id,
            agent: &self.agent,
            extra: json!({}),
        };

        debug!(url = %url, tool = tool, "invoking remote tool");
        let response = self
            .http
            .post(&url)
            .query(&[("directory", directory.as_str())])
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| ForemanError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ForemanError::Http(format!(
                "tool endpoint returned {}",
                response.status()
            )));
        }

        let payload: RemoteToolResponse = response
            .json()
            .await
            .map_err(|err| ForemanError::Http(err.to_string()))?;

        if payload.success {
            Ok(ToolOutcome::ok(payload.result.output))
        } else {
            Ok(ToolOutcome::failed(format!(
                "remote {tool} reported failure: {}",
                payload.result.output
            )))
        }
    }
}
