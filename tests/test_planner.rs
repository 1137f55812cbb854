//! Test suite for the task planner and its fallback behavior.

use async_trait::async_trait;
use std::sync::Arc;

use foreman::{
    Budget, ChatMessage, CompletionClient, CompletionResponse, ForemanError, Result, TaskPlanner,
};

/// A completion backend that always fails.
struct FailingClient;

#[async_trait]
impl CompletionClient for FailingClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<CompletionResponse> {
        Err(ForemanError::Completion("boom".to_string()))
    }
}

/// A completion backend that returns a fixed string.
struct StaticClient {
    content: &'static str,
}

#[async_trait]
impl CompletionClient for StaticClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            content: self.content.to_string(),
        })
    }
}

#[tokio::test]
async fn fallback_on_completion_error() {
    let planner = TaskPlanner::new(Arc::new(FailingClient));
    let tasks = planner.plan("write a script", "").await;

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task_id, "T1");
    assert!(tasks[0].description.contains("write a script"));
    assert_eq!(tasks[0].success_criteria, vec!["Request completed and verified"]);
    assert!(tasks[0].dependencies.is_empty());
}

/// A completion backend whose failure arrives through the anyhow bridge,
/// the way an embedding application's client would report one.
struct WrappedErrorClient;

#[async_trait]
impl CompletionClient for WrappedErrorClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<CompletionResponse> {
        Err(anyhow::anyhow!("gateway gave up").into())
    }
}

#[tokio::test]
async fn fallback_on_wrapped_backend_error() {
    let planner = TaskPlanner::new(Arc::new(WrappedErrorClient));
    let tasks = planner.plan("recover gracefully", "").await;

    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].description.contains("recover gracefully"));
}

#[tokio::test]
async fn fallback_on_invalid_json() {
    let planner = TaskPlanner::new(Arc::new(StaticClient { content: "not-json" }));
    let tasks = planner.plan("add readme", "").await;

    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].description.contains("add readme"));
}

#[tokio::test]
async fn fallback_on_empty_response() {
    let planner = TaskPlanner::new(Arc::new(StaticClient { content: "   " }));
    let tasks = planner.plan("do a thing", "").await;
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].description.starts_with("Implement user request:"));
}

#[tokio::test]
async fn fallback_on_empty_task_array() {
    let planner = TaskPlanner::new(Arc::new(StaticClient {
        content: r#"{"tasks": []}"#,
    }));
    let tasks = planner.plan("refactor src/app.py", "").await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].files, vec!["src/app.py"]);
}

#[tokio::test]
async fn parses_fenced_plan_with_coercion() {
    let content = r#"Here is the plan:
```json
{"tasks": [
    {"task_id": "T1", "description": "Create config", "files": ["conf/app.yaml"], "budget": "small"},
    {"description": "Document it", "files": ["docs/usage.md"], "success_criteria": [" usage documented "]}
]}
```"#;
    let planner = TaskPlanner::new(Arc::new(StaticClient { content }));

    let tasks = planner.plan("set up the app", "prior context").await;
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].budget, Budget::Small);
    assert_eq!(tasks[1].task_id, "T2");
    assert_eq!(tasks[1].success_criteria, vec!["usage documented"]);
}

#[tokio::test]
async fn plan_respects_max_tasks() {
    let content = r#"{"tasks": [
        {"description": "one"}, {"description": "two"}, {"description": "three"},
        {"description": "four"}, {"description": "five"}, {"description": "six"},
        {"description": "seven"}
    ]}"#;
    let planner = TaskPlanner::new(Arc::new(StaticClient { content })).with_max_tasks(3);

    let tasks = planner.plan("big request", "").await;
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[2].description, "three");
}
