//! Completion capability seam.
//!
//! The engine never talks to a model directly; it consumes this trait.
//! Live backends (Ollama, an HTTP gateway, a recorded cassette) live with
//! the embedding application, and tests plug in scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Role of a chat message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a completion prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The text produced by a completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

/// Sends prompt messages to a text-completion backend.
///
/// Implementations must enforce their own request timeout; nothing in the
/// engine waits on a completion without a bound.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// # Errors
    ///
    /// Returns an error on any invocation failure (auth, network, process).
    /// Callers in this crate recover from every such error locally.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<CompletionResponse>;
}
