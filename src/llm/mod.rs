// ABOUTME: Completion client boundary — request types, error taxonomy, and the client trait.
// ABOUTME: The OpenAI-compatible HTTP implementation lives in `openai`.

pub mod openai;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use crate::room::{HistoryLog, Role};

pub use openai::OpenAiClient;

/// API credential. Held in memory only: no `Serialize`, redacted `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key, rejecting blank input.
    pub fn new(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionMessage {
    pub role: Role,
    pub content: String,
}

/// A full completion request: the whole conversation, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
}

impl CompletionRequest {
    /// Map every history entry, in order, onto the API's role vocabulary.
    pub fn from_history(model: &str, history: &HistoryLog) -> Self {
        Self {
            model: model.to_string(),
            messages: history
                .iter()
                .map(|entry| CompletionMessage {
                    role: entry.role,
                    content: entry.content.clone(),
                })
                .collect(),
        }
    }
}

/// Failures talking to the completion service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    #[error("invalid API credential: {0}")]
    Auth(String),
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("network error: {0}")]
    Transport(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
    #[error("completion returned no text")]
    EmptyResponse,
}

impl CompletionError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) | CompletionError::RateLimited { .. } => true,
            CompletionError::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Server-requested delay before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CompletionError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// A hosted chat-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Single-shot completion returning the full text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Streamed completion yielding text fragments until the response is done.
    fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> BoxStream<'static, Result<String, CompletionError>>;
}
