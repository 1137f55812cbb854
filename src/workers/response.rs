//! Shared worker plumbing: task prompt construction, tolerant parsing of
//! model responses, and post-hoc file verification.
//!
//! Both worker variants compose these helpers rather than inheriting from
//! each other; the only divergence between them is what happens to the
//! `tools_used` list.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

use crate::core::errors::{ForemanError, Result};
use crate::llm::{ChatMessage, CompletionClient};
use crate::planner::planner::TaskSpec;
use crate::workers::worker::{TestRun, WorkerResult};

/// Standard error appended when claimed file changes do not verify.
pub const VERIFICATION_FAILED_ERROR: &str = "Verification failed: claimed files do not exist";

/// How much of a raw undecodable response is kept in logs for debugging.
const RAW_PREVIEW_CHARS: usize = 500;

lazy_static! {
    // CSI sequences and the OSC title-set sequences some model CLIs emit.
    static ref ANSI_ESCAPES: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07").expect("valid ANSI regex");
}

/// A tool action the model reports having taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolUse {
    pub tool: String,
    #[serde(alias = "path")]
    pub file: Option<String>,
    pub content: Option<String>,
    pub command: Option<String>,
    pub directory: Option<String>,
    pub pattern: Option<String>,
    pub result: Option<String>,
}

/// The JSON document a worker model is instructed to return. Every field
/// is defaulted so partial responses still decode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerResponse {
    pub success: bool,
    pub tools_used: Vec<ToolUse>,
    pub files_modified: Vec<String>,
    pub files_created: Vec<String>,
    pub tests_run: Vec<Value>,
    pub verification_passed: bool,
    pub errors: Vec<String>,
    pub logs: String,
}

impl WorkerResponse {
    /// Entries that do not match the `{name, status, duration_ms}` shape
    /// are dropped rather than failing the whole response.
    pub fn test_runs(&self) -> Vec<TestRun> {
        self.tests_run
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}

/// Build the task-grounding prompt sent to a worker model: task fields,
/// the four-tool catalog, and the exact JSON result schema.
pub fn build_task_prompt(task: &TaskSpec) -> String {
    let mut parts: Vec<String> = vec![
        format!("Task ID: {}", task.task_id),
        format!("Description: {}", task.description),
        String::new(),
    ];

    if !task.files.is_empty() {
        parts.push("Files to work with:".to_string());
        for file in &task.files {
            parts.push(format!("  - {file}"));
        }
        parts.push(String::new());
    }

    if !task.success_criteria.is_empty() {
        parts.push("Success criteria:".to_string());
        for criterion in &task.success_criteria {
            parts.push(format!("  - {criterion}"));
        }
        parts.push(String::new());
    }

    parts.extend(
        [
            "AVAILABLE TOOLS:",
            "You have access to the following tools to execute this task:",
            "",
            "1. read_file(file_path): Read a file's contents",
            "   Example: read_file('config.py')",
            "",
            "2. write_file(file_path, content): Write content to a file",
            "   Example: write_file('hello.py', 'print(\"Hello\")')",
            "",
            "3. execute_bash(command): Execute a bash command",
            "   Example: execute_bash('python hello.py')",
            "",
            "4. list_files(directory, pattern): List files in a directory",
            "   Example: list_files('.', '*.py')",
            "",
            "TOOL USAGE INSTRUCTIONS:",
            "- Use tools to actually perform file operations and run commands",
            "- After using tools, verify the results",
            "- Include tool usage in your logs",
            "",
            "Execute this task and return a JSON response with this exact format:",
            "{",
            "  \"success\": true/false,",
            "  \"tools_used\": [{\"tool\": \"tool_name\", \"file\": \"file_path\", \"result\": \"success/failure\"}],",
            "  \"files_modified\": [\"list of file paths\"],",
            "  \"files_created\": [\"list of new file paths\"],",
            "  \"tests_run\": [{\"name\": \"test name\", \"status\": \"passed/failed\", \"duration_ms\": 123}],",
            "  \"verification_passed\": true/false,",
            "  \"errors\": [\"list of error messages\"],",
            "  \"logs\": \"execution log text including tool usage\"",
            "}",
            "",
            "IMPORTANT:",
            "- Use the available tools to actually perform operations",
            "- Verify all changes before claiming success",
            "- Read files back after writing to confirm",
            "- Run tests if applicable",
            "- Report actual errors, not assumptions",
            "",
            "Begin execution:",
        ]
        .iter()
        .map(|line| (*line).to_string()),
    );

    parts.join("\n")
}

/// Remove terminal escape sequences from a raw model/CLI response.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPES.replace_all(text, "").into_owned()
}

/// Parse a model response as JSON, tolerant of markdown fencing, ANSI
/// escapes, and surrounding prose.
///
/// Scans for each top-level `{` or `[` in turn and decodes the first
/// prefix that forms a complete JSON value, ignoring trailing text.
///
/// # Errors
///
/// [`ForemanError::ResponseParse`] only when no decodable JSON value is
/// found anywhere in the text.
pub fn parse_worker_response(raw: &str) -> Result<WorkerResponse> {
    let cleaned = strip_ansi(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(ForemanError::ResponseParse("empty response".to_string()));
    }

    for (index, ch) in trimmed.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&trimmed[index..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return serde_json::from_value(value)
                .map_err(|err| ForemanError::ResponseParse(err.to_string()));
        }
    }

    Err(ForemanError::ResponseParse(
        "no JSON object found in response".to_string(),
    ))
}

/// Why the shared model exchange produced no usable response.
pub(crate) enum ExchangeFailure {
    Completion(String),
    Parse { message: String, raw_preview: String },
}

impl ExchangeFailure {
    /// Collapse into the failed result the worker reports for this task.
    pub(crate) fn into_result(self, task_id: &str) -> WorkerResult {
        match self {
            ExchangeFailure::Completion(message) => WorkerResult::failed(
                task_id,
                message.clone(),
                format!("Completion error: {message}"),
            ),
            ExchangeFailure::Parse {
                message,
                raw_preview,
            } => WorkerResult::failed(task_id, message, format!("Raw response: {raw_preview}")),
        }
    }
}

/// Send the task prompt and parse the reply. Shared by both worker
/// variants; each maps a failure into its own failed result.
pub(crate) async fn exchange(
    client: &dyn CompletionClient,
    task: &TaskSpec,
) -> std::result::Result<WorkerResponse, ExchangeFailure> {
    let prompt = build_task_prompt(task);
    let messages = [ChatMessage::user(prompt)];

    let raw = match client.complete(&messages).await {
        Ok(response) => response.content,
        Err(err) => return Err(ExchangeFailure::Completion(err.to_string())),
    };

    match parse_worker_response(&raw) {
        Ok(response) => Ok(response),
        Err(err) => Err(ExchangeFailure::Parse {
            message: err.to_string(),
            raw_preview: truncate_chars(&raw, RAW_PREVIEW_CHARS),
        }),
    }
}

/// Filter claimed file changes against what actually exists on disk.
///
/// A result whose claims are zeroed out entirely gets
/// `verification_passed = false` and a standard error appended, even if
/// the worker reported success.
pub fn verify_files(result: &mut WorkerResult, working_dir: &Path) {
    let claimed_any = !(result.files_modified.is_empty() && result.files_created.is_empty());

    result.files_modified = retain_existing(
        std::mem::take(&mut result.files_modified),
        working_dir,
        "modified",
    );
    result.files_created = retain_existing(
        std::mem::take(&mut result.files_created),
        working_dir,
        "created",
    );

    if claimed_any && result.files_modified.is_empty() && result.files_created.is_empty() {
        if result.verification_passed {
            warn!(task_id = %result.task_id, "worker claimed verification passed but files do not exist");
        }
        result.verification_passed = false;
        result.errors.push(VERIFICATION_FAILED_ERROR.to_string());
    }
}

fn retain_existing(paths: Vec<String>, working_dir: &Path, kind: &str) -> Vec<String> {
    paths
        .into_iter()
        .filter(|path| {
            let exists = working_dir.join(path).exists();
            if !exists {
                warn!(path = %path, kind = kind, "claimed file does not exist");
            }
            exists
        })
        .collect()
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
