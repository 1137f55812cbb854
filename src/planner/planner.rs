//! Task planning: turning a request into structured, ordered tasks.
//!
//! Planning is explicitly best-effort against an unreliable text generator.
//! Every failure mode (invocation error, empty output, garbage JSON, zero
//! usable entries) degrades to a usable single-task fallback plan, so the
//! coordinator never has to special-case "no plan".

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, CompletionClient};
use crate::planner::parse;

/// Default cap on the number of tasks in one plan.
pub const DEFAULT_MAX_TASKS: usize = 6;

/// Extensions the fallback plan recognizes when mining file paths out of
/// the raw request text.
const FALLBACK_EXTENSIONS: [&str; 6] = [".py", ".md", ".json", ".yaml", ".yml", ".txt"];

/// Planning instruction sent as the system message.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior software architect who coordinates multiple coding agents.
Break the user's request into atomic tasks. For each task provide:
- description: short imperative sentence
- files: list of files to read/write (empty list allowed)
- success_criteria: bullet-style list of verifiable checks
- budget: estimated token/effort budget (small, medium, large)
- dependencies: optional list of task_ids this task depends on
Return JSON with the schema:
{
  "tasks": [
     {
       "task_id": "T1",
       "description": "...",
       "files": ["path/to/file"],
       "success_criteria": ["..."],
       "budget": "medium",
       "dependencies": ["T0"]
     }
  ]
}
Keep tasks between 1 and 6 items. Respond with JSON only."#;

/// Effort budget label for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    Small,
    #[default]
    Medium,
    Large,
}

impl Budget {
    /// Coerce a free-form budget string; anything unknown is `Medium`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "small" => Budget::Small,
            "large" => Budget::Large,
            _ => Budget::Medium,
        }
    }
}

/// An immutable description of one unit of work.
///
/// Created once per planning call, consumed by the coordinator, never
/// mutated. `dependencies` are recorded as declared by the planner but are
/// not an ordering constraint: the coordinator trusts the planner to emit
/// tasks in a sound order and executes them as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub budget: Budget,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskSpec {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            files: Vec::new(),
            success_criteria: Vec::new(),
            budget: Budget::default(),
            dependencies: Vec::new(),
        }
    }

    /// Declare the files this task will read or write.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_success_criteria(mut self, criteria: Vec<String>) -> Self {
        self.success_criteria = criteria;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Translates requests into ordered [`TaskSpec`] lists via a completion
/// backend, with a deterministic fallback when the backend misbehaves.
pub struct TaskPlanner {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    max_tasks: usize,
}

impl TaskPlanner {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    /// Produce 1..N tasks for `request`. Infallible: any planning failure
    /// substitutes the fallback plan instead of surfacing an error.
    pub async fn plan(&self, request: &str, context_summary: &str) -> Vec<TaskSpec> {
        let messages = self.build_prompt(request, context_summary);

        let raw = match self.client.complete(&messages).await {
            Ok(response) => response.content,
            Err(err) => {
                warn!(error = %err, "planner completion failed, using fallback plan");
                return fallback_plan(request);
            }
        };
        debug!(response_len = raw.len(), "planner raw response received");

        match parse::parse_plan(&raw, self.max_tasks) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(error = %err, "planner output unusable, using fallback plan");
                fallback_plan(request)
            }
        }
    }

    fn build_prompt(&self, request: &str, context_summary: &str) -> Vec<ChatMessage> {
        let payload = json!({
            "user_request": request,
            "context_summary": context_summary,
            "max_tasks": self.max_tasks,
        });
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(payload.to_string()),
        ]
    }
}

/// The deterministic single-task plan substituted whenever model-based
/// planning fails or yields nothing usable.
///
/// Files are mined from the request: every whitespace-delimited token that
/// contains a `/` and ends in a recognized source/config extension,
/// de-duplicated preserving order.
pub fn fallback_plan(request: &str) -> Vec<TaskSpec> {
    let mut files: Vec<String> = Vec::new();
    for token in request.split_whitespace() {
        let looks_like_path = token.contains('/')
            && FALLBACK_EXTENSIONS.iter().any(|ext| token.ends_with(ext));
        if looks_like_path && !files.iter().any(|existing| existing == token) {
            files.push(token.to_string());
        }
    }

    vec![TaskSpec {
        task_id: "T1".to_string(),
        description: format!("Implement user request: {request}"),
        files,
        success_criteria: vec!["Request completed and verified".to_string()],
        budget: Budget::Medium,
        dependencies: Vec::new(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_extracts_paths_in_order_without_duplicates() {
        let tasks =
            fallback_plan("update docs/readme.md then src/main.py then docs/readme.md again");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "T1");
        assert_eq!(tasks[0].files, vec!["docs/readme.md", "src/main.py"]);
        assert!(tasks[0].description.contains("update docs/readme.md"));
    }

    #[test]
    fn fallback_ignores_tokens_without_slash_or_known_extension() {
        let tasks = fallback_plan("fix readme.md and src/lib.rs and a/b.txt");
        // readme.md has no slash, lib.rs is not a recognized extension
        assert_eq!(tasks[0].files, vec!["a/b.txt"]);
        assert_eq!(
            tasks[0].success_criteria,
            vec!["Request completed and verified"]
        );
    }

    #[test]
    fn budget_coerces_unknown_to_medium() {
        assert_eq!(Budget::parse("small"), Budget::Small);
        assert_eq!(Budget::parse("LARGE"), Budget::Large);
        assert_eq!(Budget::parse("enormous"), Budget::Medium);
        assert_eq!(Budget::parse(""), Budget::Medium);
    }
}
