//! Lifecycle event notifications for coordinated execution.
//!
//! The engine only emits well-defined events; transport and delivery are
//! collaborator concerns. Sinks are fire-and-forget: a sink that cannot
//! deliver must never fail the calling operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Install a default tracing subscriber (INFO and up to stdout) for
/// binaries and demos that do not configure their own. Calling it again
/// after a subscriber is installed is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

/// Lifecycle events emitted while planning and executing tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinationEvent {
    TaskPlanned {
        task_id: String,
        description: String,
    },
    TaskAssigned {
        task_id: String,
        worker_id: String,
        description: String,
    },
    WorkerCompleted {
        task_id: String,
        success: bool,
        files_modified: Vec<String>,
        errors: Vec<String>,
    },
}

impl CoordinationEvent {
    pub fn task_id(&self) -> &str {
        match self {
            CoordinationEvent::TaskPlanned { task_id, .. }
            | CoordinationEvent::TaskAssigned { task_id, .. }
            | CoordinationEvent::WorkerCompleted { task_id, .. } => task_id,
        }
    }
}

/// Event envelope with delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub sequence: u64,
    pub source_app: String,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub event: CoordinationEvent,
}

/// Receives event envelopes. Emission is infallible by contract.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: &EventEnvelope);
}

/// Wraps an optional sink and stamps envelopes with sequence numbers.
pub struct EventEmitter {
    sink: Option<Arc<dyn EventSink>>,
    source_app: String,
    session_id: Option<String>,
    sequence: AtomicU64,
}

impl EventEmitter {
    pub fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            sink,
            source_app: "foreman".to_string(),
            session_id: None,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    pub fn emit(&self, event: CoordinationEvent) {
        let Some(sink) = &self.sink else {
            debug!(task_id = event.task_id(), "no event sink configured, dropping event");
            return;
        };
        let envelope = EventEnvelope {
            version: 1,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            source_app: self.source_app.clone(),
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        sink.emit(&envelope);
    }
}

/// A sink that writes events to the tracing log.
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, envelope: &EventEnvelope) {
        info!(
            sequence = envelope.sequence,
            event = ?envelope.event,
            "coordination event"
        );
    }
}

/// A sink that buffers events in memory. Intended for tests and REPL-style
/// inspection.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, envelope: &EventEnvelope) {
        if let Ok(mut events) = self.events.lock() {
            events.push(envelope.clone());
        }
    }
}

/// A sink that POSTs envelopes to an observability endpoint.
///
/// Delivery is spawned onto the current runtime and forgotten; failures are
/// warn-logged and never reach the coordinator.
pub struct HttpEventSink {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpEventSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl EventSink for HttpEventSink {
    fn emit(&self, envelope: &EventEnvelope) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, dropping observability event");
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;
        let body = envelope.clone();
        handle.spawn(async move {
            let sent = client.post(&url).timeout(timeout).json(&body).send().await;
            match sent {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), url = %url, "observability endpoint rejected event");
                }
                Ok(_) => debug!(sequence = body.sequence, "sent observability event"),
                Err(err) => warn!(error = %err, url = %url, "failed to send observability event"),
            }
        });
    }
}
