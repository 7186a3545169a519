// ABOUTME: In-memory history store for single-process rooms.
// ABOUTME: Same contract as the file store, backed by a mutex-guarded log.

use std::sync::Mutex;

use crate::room::{ChatEntry, HistoryLog};
use crate::store::{AppendOutcome, HistoryStore, StoreError};

/// History kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    log: Mutex<HistoryLog>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing entries.
    pub fn with_entries(entries: Vec<ChatEntry>) -> Self {
        Self {
            log: Mutex::new(HistoryLog::from_entries(entries)),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn read(&self) -> Result<HistoryLog, StoreError> {
        let guard = self.log.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.clone())
    }

    fn append(&self, entry: ChatEntry) -> Result<u64, StoreError> {
        let mut guard = self.log.lock().map_err(|_| StoreError::Poisoned)?;
        guard.push(entry);
        Ok(guard.version())
    }

    fn append_if(
        &self,
        expected_version: u64,
        entry: ChatEntry,
    ) -> Result<AppendOutcome, StoreError> {
        let mut guard = self.log.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.version() != expected_version {
            return Ok(AppendOutcome::Conflict {
                current: guard.clone(),
            });
        }
        guard.push(entry);
        Ok(AppendOutcome::Appended {
            version: guard.version(),
        })
    }
}
