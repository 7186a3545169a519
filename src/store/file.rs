// ABOUTME: File-backed history store — one JSON array shared by every session on the machine.
// ABOUTME: Writes happen under an exclusive lock and land via temp file + rename.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::room::{ChatEntry, HistoryLog};
use crate::store::{AppendOutcome, HistoryStore, StoreError};

/// History persisted as a single JSON array file.
///
/// Readers take no lock: the rename in [`write_atomic`] means they see either
/// the previous or the next complete log. Writers serialize on an advisory
/// lock held on a sibling `.lock` file, which closes the read-modify-write
/// race between concurrent appenders.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileHistoryStore {
    /// Open the store at `path`, creating an empty log if none exists yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock_path = sibling_with_suffix(&path, "lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { path, lock_path };
        let _guard = store.lock()?;
        if !store.path.exists() {
            tracing::info!(path = %store.path.display(), "creating empty chat history");
            store.write_atomic(&HistoryLog::new())?;
        }
        Ok(store)
    }

    /// Path of the JSON log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<File, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| StoreError::Lock {
                path: self.lock_path.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&file).map_err(|source| StoreError::Lock {
            path: self.lock_path.clone(),
            source,
        })?;
        // Released when the handle is dropped.
        Ok(file)
    }

    fn load(&self) -> Result<HistoryLog, StoreError> {
        if !self.path.exists() {
            return Ok(HistoryLog::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the log on disk. Callers must hold the write lock.
    fn write_atomic(&self, log: &HistoryLog) -> Result<(), StoreError> {
        let tmp_path = sibling_with_suffix(&self.path, &format!("{}.tmp", std::process::id()));
        let content = serde_json::to_string_pretty(log)?;

        let result = write_and_sync(&tmp_path, content.as_bytes())
            .map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })
            .and_then(|()| {
                fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

impl HistoryStore for FileHistoryStore {
    fn read(&self) -> Result<HistoryLog, StoreError> {
        self.load()
    }

    fn append(&self, entry: ChatEntry) -> Result<u64, StoreError> {
        let _guard = self.lock()?;
        let mut log = self.load()?;
        log.push(entry);
        self.write_atomic(&log)?;
        tracing::debug!(path = %self.path.display(), version = log.version(), "appended entry");
        Ok(log.version())
    }

    fn append_if(
        &self,
        expected_version: u64,
        entry: ChatEntry,
    ) -> Result<AppendOutcome, StoreError> {
        let _guard = self.lock()?;
        let mut log = self.load()?;
        if log.version() != expected_version {
            tracing::debug!(
                expected = expected_version,
                actual = log.version(),
                "compare-and-append conflict"
            );
            return Ok(AppendOutcome::Conflict { current: log });
        }
        log.push(entry);
        self.write_atomic(&log)?;
        Ok(AppendOutcome::Appended {
            version: log.version(),
        })
    }
}

/// `chat.json` + `lock` → `chat.json.lock`.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
