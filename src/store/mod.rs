// ABOUTME: History store — the durable, shared log every session reads and appends to.
// ABOUTME: Defines the store trait and its error type; file and in-memory backends live below.

pub mod file;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task;

use crate::room::{ChatEntry, HistoryLog};

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;

/// Errors raised by a history store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history at {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not lock history at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("in-memory history lock was poisoned")]
    Poisoned,
    #[error("history task failed: {0}")]
    Task(String),
}

/// Result of an optimistic compare-and-append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The entry was written; the log is now at `version`.
    Appended { version: u64 },
    /// Another writer got there first. Nothing was written.
    Conflict { current: HistoryLog },
}

/// Durable ordered log of chat entries shared across sessions.
///
/// Appends are atomic: two writers appending at the same time both land, in
/// some order, and a reader never observes a partially written log.
pub trait HistoryStore: Send + Sync {
    /// Read the full current log.
    fn read(&self) -> Result<HistoryLog, StoreError>;

    /// Append one entry at the end. Returns the new version.
    fn append(&self, entry: ChatEntry) -> Result<u64, StoreError>;

    /// Append only if the log is still at `expected_version`.
    fn append_if(&self, expected_version: u64, entry: ChatEntry)
    -> Result<AppendOutcome, StoreError>;
}

/// Run a store operation on the blocking pool.
///
/// File-backed appends wait on a cross-process lock and fsync, so async
/// callers go through here instead of calling the store directly.
pub async fn run_blocking<T, F>(store: &Arc<dyn HistoryStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn HistoryStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Task(format!("failed to join blocking task: {}", e)))?
}
