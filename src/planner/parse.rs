//! Tolerant parsing of planner model output.
//!
//! The model may answer with prose, markdown-fenced JSON, or garbage. This
//! parser extracts what JSON it can, coerces every field to its expected
//! type, and reports a discriminated failure instead of panicking or
//! guessing. Coercion rules (synthesized ids, default budget) live here,
//! not at call sites.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::planner::planner::{Budget, TaskSpec};

/// Why a planner response could not be turned into a plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("planner returned empty response")]
    EmptyResponse,
    #[error("planner returned invalid JSON: {0}")]
    InvalidJson(String),
    #[error("planner returned no usable tasks")]
    NoTasks,
}

/// Extract the JSON portion of a model response.
///
/// Preference order: contents of a ```json fence, contents of a generic
/// ``` fence, then (when the text does not already start with `{`) the
/// substring between the first `{` and the last `}`.
pub fn extract_json(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(inner) = fenced_block(trimmed, "```json") {
        return inner;
    }
    if let Some(inner) = fenced_block(trimmed, "```") {
        return inner;
    }
    if !trimmed.starts_with('{') {
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                return trimmed[start..=end].to_string();
            }
        }
    }
    trimmed.to_string()
}

fn fenced_block(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let end = text[start..].find("```")? + start;
    Some(text[start..end].trim().to_string())
}

/// Parse a planner response into at most `max_tasks` tasks.
///
/// Entries that fail coercion are skipped and logged, not fatal to the
/// whole plan; an empty surviving set is reported as [`PlanParseError::NoTasks`]
/// so the caller can substitute the fallback plan.
pub fn parse_plan(text: &str, max_tasks: usize) -> Result<Vec<TaskSpec>, PlanParseError> {
    let raw = extract_json(text);
    if raw.is_empty() {
        return Err(PlanParseError::EmptyResponse);
    }

    let payload: Value =
        serde_json::from_str(&raw).map_err(|err| PlanParseError::InvalidJson(err.to_string()))?;

    let entries = payload
        .get("tasks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut tasks: Vec<TaskSpec> = Vec::new();
    for entry in entries.iter().take(max_tasks) {
        match coerce_task(entry, tasks.len()) {
            Some(mut task) => {
                // Ids must be unique within a plan; a repeated id is
                // renumbered positionally instead of dropping the task.
                if tasks.iter().any(|existing| existing.task_id == task.task_id) {
                    let renumbered = next_free_id(&tasks);
                    warn!(
                        task_id = %task.task_id,
                        renumbered = %renumbered,
                        "duplicate task id in plan, renumbering"
                    );
                    task.task_id = renumbered;
                }
                tasks.push(task);
            }
            None => warn!(entry = %entry, "skipping unusable task entry"),
        }
    }

    if tasks.is_empty() {
        return Err(PlanParseError::NoTasks);
    }
    Ok(tasks)
}

/// First `T{n}` id not already taken by a surviving task, counting from
/// the next position.
fn next_free_id(tasks: &[TaskSpec]) -> String {
    let mut n = tasks.len() + 1;
    loop {
        let candidate = format!("T{n}");
        if !tasks.iter().any(|task| task.task_id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Coerce one `tasks[]` entry. `position` is the index the task will occupy
/// among the surviving tasks, used to synthesize a missing id.
fn coerce_task(entry: &Value, position: usize) -> Option<TaskSpec> {
    let object = entry.as_object()?;

    let description = object
        .get("description")
        .and_then(string_like)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();
    if description.is_empty() {
        return None;
    }

    let task_id = object
        .get("task_id")
        .and_then(string_like)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("T{}", position + 1));

    let budget = object
        .get("budget")
        .and_then(string_like)
        .map(|raw| Budget::parse(&raw))
        .unwrap_or_default();

    Some(TaskSpec {
        task_id,
        description,
        files: string_list(object.get("files")),
        success_criteria: trimmed_string_list(object.get("success_criteria")),
        budget,
        dependencies: string_list(object.get("dependencies")),
    })
}

/// Accept strings as-is; numbers and booleans are stringified (the model
/// sometimes emits `"budget": 2` style values).
fn string_like(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(string_like).collect())
        .unwrap_or_default()
}

fn trimmed_string_list(value: Option<&Value>) -> Vec<String> {
    string_list(value)
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect()
}
