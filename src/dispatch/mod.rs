// ABOUTME: Dispatch policy — decides when a posted message summons the assistant and runs the call.
// ABOUTME: Builds the request from the shared history and appends exactly one reply on success.

pub mod trigger;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::llm::{CompletionClient, CompletionError, CompletionRequest};
use crate::room::{ChatEntry, HistoryLog, Role};
use crate::store::{self, HistoryStore, StoreError};

pub use trigger::TriggerWord;

/// Failure of a triggered dispatch. History is unchanged in every case.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to a posted message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The message did not carry the trigger.
    Skipped,
    /// The assistant replied and the reply was appended.
    Replied(ChatEntry),
}

/// How the assistant appears in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantIdentity {
    pub name: String,
    pub icon: String,
}

/// Exponential backoff for transient completion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    const MAX_DELAY: Duration = Duration::from_secs(30);

    /// Delay before retry number `attempt` (0-based), honoring a server hint.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(Self::MAX_DELAY);
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs.min(60)).max(backoff),
            None => backoff,
        }
    }
}

/// Everything the dispatcher needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub trigger: TriggerWord,
    pub model: String,
    pub assistant: AssistantIdentity,
    pub streaming: bool,
    pub retry: RetryPolicy,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trigger: TriggerWord::new(&config.room.trigger),
            model: config.llm.model.clone(),
            assistant: AssistantIdentity {
                name: config.room.assistant_name.clone(),
                icon: config.room.assistant_icon.clone(),
            },
            streaming: config.llm.stream,
            retry: RetryPolicy {
                max_retries: config.llm.max_retries,
                base_delay: Duration::from_millis(config.llm.retry_base_delay_ms),
            },
        }
    }
}

/// Runs the assistant for triggered messages.
pub struct Dispatcher {
    client: Arc<dyn CompletionClient>,
    store: Arc<dyn HistoryStore>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn HistoryStore>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Only user entries carrying the trigger summon the assistant.
    pub fn should_respond(&self, entry: &ChatEntry) -> bool {
        entry.role == Role::User && self.settings.trigger.matches(&entry.content)
    }

    /// The request for a given history: every entry, in order.
    pub fn build_request(&self, history: &HistoryLog) -> CompletionRequest {
        CompletionRequest::from_history(&self.settings.model, history)
    }

    /// Handle a freshly posted entry.
    ///
    /// When triggered, the request is built from a fresh read of the store, so
    /// it includes anything other sessions wrote. Streamed fragments go to
    /// `deltas` as they arrive. The reply is appended once, after the final
    /// successful attempt; on any error nothing is appended.
    pub async fn dispatch(
        &self,
        posted: &ChatEntry,
        deltas: Option<&mpsc::Sender<String>>,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !self.should_respond(posted) {
            tracing::debug!(sender = %posted.sender_name, "message not triggered");
            return Ok(DispatchOutcome::Skipped);
        }

        let history = store::run_blocking(&self.store, |s| s.read()).await?;
        let request = self.build_request(&history);
        tracing::info!(
            sender = %posted.sender_name,
            history = history.len(),
            streaming = self.settings.streaming,
            "dispatching to completion API"
        );

        let text = self.complete_with_retry(&request, deltas).await?;
        if text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse.into());
        }

        let reply = ChatEntry::assistant(
            &self.settings.assistant.name,
            &self.settings.assistant.icon,
            &text,
        );
        let appended = reply.clone();
        let version = store::run_blocking(&self.store, move |s| s.append(appended)).await?;
        tracing::info!(version, chars = text.chars().count(), "assistant reply appended");
        Ok(DispatchOutcome::Replied(reply))
    }

    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
        deltas: Option<&mpsc::Sender<String>>,
    ) -> Result<String, CompletionError> {
        let mut attempt = 0;
        loop {
            let result = if self.settings.streaming {
                self.stream_once(request, deltas).await
            } else {
                self.client.complete(request).await.map_err(|e| (e, false))
            };

            match result {
                Ok(text) => return Ok(text),
                Err((err, partial)) => {
                    // Once fragments were shown, a retry would duplicate them.
                    if partial || !err.is_transient() || attempt >= self.settings.retry.max_retries {
                        tracing::error!(error = %err, attempt, "completion failed");
                        return Err(err);
                    }
                    let delay = self.settings.retry.delay(attempt, err.retry_after_secs());
                    tracing::warn!(
                        error = %err,
                        retry = attempt + 1,
                        max = self.settings.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying completion"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One streamed attempt. On error, reports whether any fragment arrived.
    async fn stream_once(
        &self,
        request: &CompletionRequest,
        deltas: Option<&mpsc::Sender<String>>,
    ) -> Result<String, (CompletionError, bool)> {
        let mut stream = self.client.complete_stream(request);
        let mut full = String::new();
        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    if let Some(tx) = deltas {
                        let _ = tx.send(text.clone()).await;
                    }
                    full.push_str(&text);
                }
                Err(e) => return Err((e, !full.is_empty())),
            }
        }
        Ok(full)
    }
}
