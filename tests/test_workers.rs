//! Test suite for worker variants: local confirmation vs remote-routed
//! execution of claimed tool actions, and failure recovery into results.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use foreman::{
    ChatMessage, CompletionClient, CompletionResponse, ForemanError, LocalWorker, RemoteWorker,
    Result, TaskSpec, ToolExecutor, Worker,
};

struct ScriptedClient {
    content: String,
}

impl ScriptedClient {
    fn new(content: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            content: content.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            content: self.content.clone(),
        })
    }
}

struct FailingClient;

#[async_trait]
impl CompletionClient for FailingClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<CompletionResponse> {
        Err(ForemanError::Completion("connection refused".to_string()))
    }
}

fn task_for(files: &[&str]) -> TaskSpec {
    TaskSpec::new("T1", "do the work")
        .with_files(files.iter().map(|file| (*file).to_string()).collect())
}

#[tokio::test]
async fn local_worker_confirms_existing_claims() {
    let dir = tempfile::tempdir().unwrap();
    // Simulate the model having actually written the file it claims.
    std::fs::write(dir.path().join("out.txt"), "written by model").unwrap();

    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [{"tool": "write_file", "file": "out.txt", "result": "success"}],
            "files_created": ["out.txt"],
            "verification_passed": true,
            "logs": "wrote out.txt"
        }"#,
    );
    let worker = LocalWorker::new("test-model", client);

    let result = worker.execute(&task_for(&["out.txt"]), dir.path()).await.unwrap();

    assert!(result.success);
    assert!(result.verification_passed);
    assert_eq!(result.files_created, vec!["out.txt"]);
    assert!(result.logs.contains("wrote out.txt"));
    assert!(result.logs.contains("Verified: out.txt"));
    // Confirmation must not have altered the file.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
        "written by model"
    );
}

#[tokio::test]
async fn local_worker_downgrades_phantom_claims() {
    let dir = tempfile::tempdir().unwrap();

    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [{"tool": "write_file", "file": "ghost.txt", "result": "success"}],
            "files_created": ["ghost.txt"],
            "verification_passed": true
        }"#,
    );
    let worker = LocalWorker::new("test-model", client);

    let result = worker.execute(&task_for(&["ghost.txt"]), dir.path()).await.unwrap();

    assert!(result.files_created.is_empty());
    assert!(!result.verification_passed);
    assert!(!result.errors.is_empty());
    assert!(result.logs.contains("claimed but doesn't exist"));
}

#[tokio::test]
async fn local_worker_recovers_from_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new("I am sorry, I cannot produce JSON today.");
    let worker = LocalWorker::new("test-model", client);

    let result = worker.execute(&task_for(&[]), dir.path()).await.unwrap();

    assert!(!result.success);
    assert!(result.errors[0].contains("Invalid JSON response"));
    assert!(result.logs.contains("Raw response: I am sorry"));
}

#[tokio::test]
async fn local_worker_recovers_from_completion_error() {
    let dir = tempfile::tempdir().unwrap();
    let worker = LocalWorker::new("test-model", Arc::new(FailingClient));

    let result = worker.execute(&task_for(&[]), dir.path()).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("connection refused"));
}

#[tokio::test]
async fn remote_worker_executes_claimed_writes() {
    let dir = tempfile::tempdir().unwrap();

    // The model claims a write it never performed; the remote-routed
    // worker performs it for real through the (fallback) tool executor.
    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [
                {"tool": "write_file", "file": "made.txt", "content": "hello from tools"}
            ],
            "files_created": ["made.txt", "never-made.txt"],
            "verification_passed": true
        }"#,
    );
    let worker = RemoteWorker::new("test-model", client);

    let result = worker.execute(&task_for(&["made.txt"]), dir.path()).await.unwrap();

    assert!(result.success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("made.txt")).unwrap(),
        "hello from tools"
    );
    // File sets are recomputed from performed actions, not claims.
    assert_eq!(result.files_created, vec!["made.txt"]);
    assert!(result.verification_passed);
}

#[tokio::test]
async fn remote_worker_distinguishes_modified_from_created() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("existing.txt"), "old").unwrap();

    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [
                {"tool": "write_file", "file": "existing.txt", "content": "new"},
                {"tool": "write_file", "file": "fresh.txt", "content": "first"}
            ],
            "verification_passed": true
        }"#,
    );
    let worker = RemoteWorker::new("test-model", client);

    let result = worker
        .execute(&task_for(&["existing.txt", "fresh.txt"]), dir.path())
        .await
        .unwrap();

    assert_eq!(result.files_modified, vec!["existing.txt"]);
    assert_eq!(result.files_created, vec!["fresh.txt"]);
}

#[tokio::test]
async fn remote_worker_turns_tool_errors_into_task_failure() {
    let dir = tempfile::tempdir().unwrap();

    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [
                {"tool": "write_file", "content": "no path given"},
                {"tool": "read_file", "file": "missing.txt"}
            ],
            "verification_passed": true
        }"#,
    );
    let worker = RemoteWorker::new("test-model", client);

    let result = worker.execute(&task_for(&[]), dir.path()).await.unwrap();

    assert!(!result.success, "per-action errors force task failure");
    assert!(result.errors.iter().any(|error| error.contains("write_file missing path")));
    assert!(result.errors.iter().any(|error| error.contains("missing.txt")));
}

#[tokio::test]
async fn remote_worker_runs_bash_and_captures_stdout() {
    let dir = tempfile::tempdir().unwrap();

    let client = ScriptedClient::new(
        r#"{
            "success": true,
            "tools_used": [{"tool": "execute_bash", "command": "echo tooled > bashed.txt"}],
            "verification_passed": true
        }"#,
    );
    let worker = RemoteWorker::new("test-model", client);

    let result = worker.execute(&task_for(&[]), dir.path()).await.unwrap();

    assert!(result.success);
    assert!(result.logs.contains("execute_bash"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("bashed.txt")).unwrap().trim(),
        "tooled"
    );
}

#[tokio::test]
async fn tool_executor_bash_times_out_without_hanging() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolExecutor::new(dir.path());

    let output = tools
        .execute_bash("sleep 10", Duration::from_millis(100))
        .await;
    assert!(!output.success);
    assert_eq!(output.returncode, -1);
}
