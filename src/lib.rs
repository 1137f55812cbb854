// Core infrastructure modules
pub mod core {
    pub mod errors;
    pub mod locking;
}

// Coordination engine
pub mod coord; // sequential task execution with per-file locking
pub mod planner; // request -> structured task plans
pub mod workers; // pluggable task executors

// External capability seams
pub mod llm;

// Re-exports for convenience
pub use crate::core::errors::{ForemanError, Result};
pub use crate::core::locking::{LockGuard, LockRecord, LockTable};
pub use crate::coord::coordinator::{Coordinator, CoordinatorConfig};
pub use crate::coord::events::{
    init_tracing, CoordinationEvent, EventEmitter, EventEnvelope, EventSink, HttpEventSink,
    LoggingEventSink, MemoryEventSink,
};
pub use crate::llm::{ChatMessage, CompletionClient, CompletionResponse, Role};
pub use crate::planner::parse::PlanParseError;
pub use crate::planner::planner::{fallback_plan, Budget, TaskPlanner, TaskSpec};
pub use crate::workers::local::LocalWorker;
pub use crate::workers::remote::RemoteWorker;
pub use crate::workers::response::{
    build_task_prompt, parse_worker_response, verify_files, VERIFICATION_FAILED_ERROR,
};
pub use crate::workers::tool_client::{ToolClient, ToolOutcome};
pub use crate::workers::tool_executor::{
    BashOutput, ListOutcome, ReadOutcome, ToolExecutor, WriteOutcome,
};
pub use crate::workers::worker::{TestRun, Worker, WorkerResult};
