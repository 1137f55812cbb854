//! Worker contract and structured results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::errors::Result;
use crate::planner::planner::TaskSpec;

/// One test a worker reports having run. Opaque to the coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestRun {
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
}

/// Result from a worker execution.
///
/// Invariant (after verification): every path in `files_modified` and
/// `files_created` exists under the task's working directory. Verification
/// outranks a worker's self-reported success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub task_id: String,
    pub success: bool,
    pub files_modified: Vec<String>,
    pub files_created: Vec<String>,
    pub tests_run: Vec<TestRun>,
    pub verification_passed: bool,
    pub errors: Vec<String>,
    #[serde(default)]
    pub logs: String,
}

impl WorkerResult {
    /// A failed result carrying a single error message.
    pub fn failed(
        task_id: impl Into<String>,
        error: impl Into<String>,
        logs: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            files_modified: Vec::new(),
            files_created: Vec::new(),
            tests_run: Vec::new(),
            verification_passed: false,
            errors: vec![error.into()],
            logs: logs.into(),
        }
    }
}

/// A capability that executes one task against a working directory and
/// returns a structured result.
///
/// Implementations are expected to absorb their own failure modes into a
/// failed [`WorkerResult`] where they can; the coordinator additionally
/// converts any error that does escape into a failed result, so a worker
/// failure never aborts the task loop.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Opaque identifier reported in `TaskAssigned` events (typically the
    /// backing model name).
    fn id(&self) -> &str;

    async fn execute(&self, task: &TaskSpec, working_dir: &Path) -> Result<WorkerResult>;
}
