// ABOUTME: Session module — one connected user's context: identity, credential, cached history.
// ABOUTME: Posting goes through compare-and-append; the sync loop keeps the cache fresh.

pub mod sync;

use std::sync::Arc;

use thiserror::Error;

use crate::llm::ApiKey;
use crate::room::{ChatEntry, HistoryLog, icon_for};
use crate::store::{AppendOutcome, HistoryStore, StoreError, run_blocking};

pub use sync::{SyncEvent, SyncHandle, spawn_sync_loop};

/// Conflicts tolerated before a post gives up.
const MAX_POST_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an API key is required to chat")]
    MissingCredential,
    #[error("a username is required to chat")]
    MissingUsername,
    #[error("message is empty")]
    EmptyMessage,
    #[error("history kept changing; gave up after {0} attempts")]
    Contended(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a user supplies before chat unlocks.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub username: Option<String>,
}

/// A connected user's context, passed explicitly to every operation.
pub struct Session {
    username: String,
    icon: &'static str,
    api_key: ApiKey,
    cached: HistoryLog,
    store: Arc<dyn HistoryStore>,
}

impl Session {
    /// Validate credentials and take the initial snapshot of the room.
    pub async fn connect(
        credentials: Credentials,
        store: Arc<dyn HistoryStore>,
    ) -> Result<Self, SessionError> {
        let api_key = credentials
            .api_key
            .as_deref()
            .and_then(ApiKey::new)
            .ok_or(SessionError::MissingCredential)?;
        let username = credentials
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(SessionError::MissingUsername)?
            .to_string();

        let icon = icon_for(&username);
        let cached = run_blocking(&store, |s| s.read()).await?;
        tracing::info!(%username, icon, entries = cached.len(), "session connected");

        Ok(Self {
            username,
            icon,
            api_key,
            cached,
            store,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn icon(&self) -> &'static str {
        self.icon
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// The last-seen history.
    pub fn view(&self) -> &HistoryLog {
        &self.cached
    }

    /// Build this user's entry for `content` without writing it.
    pub fn compose(&self, content: &str) -> Result<ChatEntry, SessionError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        Ok(ChatEntry::user(&self.username, self.icon, content))
    }

    /// Append a user message after whatever is currently in the store.
    pub async fn post(&mut self, content: &str) -> Result<ChatEntry, SessionError> {
        let entry = self.compose(content)?;
        let log = append_after(&self.store, self.cached.clone(), entry.clone()).await?;
        self.apply(log);
        Ok(entry)
    }

    /// Re-read the store. Returns whether the view changed.
    pub async fn refresh(&mut self) -> Result<bool, SessionError> {
        let fresh = run_blocking(&self.store, |s| s.read()).await?;
        Ok(self.apply(fresh))
    }

    /// Adopt a snapshot delivered by the sync loop. Returns whether it differed.
    ///
    /// The log only grows, so a snapshot shorter than the cache is stale and
    /// ignored.
    pub fn apply(&mut self, log: HistoryLog) -> bool {
        if log.version() < self.cached.version() || log == self.cached {
            return false;
        }
        self.cached = log;
        true
    }
}

/// Compare-and-append `entry` against `view`, the writer's last-seen log.
///
/// On conflict `view` is replaced with the fresher log and the append retried,
/// so the entry always lands after whatever other sessions wrote. Returns the
/// log as it stands right after the append.
pub async fn append_after(
    store: &Arc<dyn HistoryStore>,
    mut view: HistoryLog,
    entry: ChatEntry,
) -> Result<HistoryLog, SessionError> {
    for _ in 0..MAX_POST_ATTEMPTS {
        let expected = view.version();
        let attempt = entry.clone();
        match run_blocking(store, move |s| s.append_if(expected, attempt)).await? {
            AppendOutcome::Appended { version } => {
                view.push(entry);
                debug_assert_eq!(view.version(), version);
                return Ok(view);
            }
            AppendOutcome::Conflict { current } => {
                tracing::debug!(
                    cached = expected,
                    current = current.version(),
                    "stale view while posting; refreshing"
                );
                view = current;
            }
        }
    }
    Err(SessionError::Contended(MAX_POST_ATTEMPTS))
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("icon", &self.icon)
            .field("api_key", &self.api_key)
            .field("entries", &self.cached.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHistoryStore;

    fn creds(key: Option<&str>, name: Option<&str>) -> Credentials {
        Credentials {
            api_key: key.map(str::to_string),
            username: name.map(str::to_string),
        }
    }

    fn store() -> Arc<dyn HistoryStore> {
        Arc::new(MemoryHistoryStore::new())
    }

    async fn join(name: &str, store: &Arc<dyn HistoryStore>) -> Session {
        Session::connect(creds(Some("sk-1"), Some(name)), store.clone())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_credential_blocks_connect() {
        let err = Session::connect(creds(None, Some("alice")), store())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
        let err = Session::connect(creds(Some("  "), Some("alice")), store())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingCredential));
    }

    #[tokio::test]
    async fn missing_username_blocks_connect() {
        let err = Session::connect(creds(Some("sk-1"), None), store())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingUsername));
        let err = Session::connect(creds(Some("sk-1"), Some("   ")), store())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingUsername));
    }

    #[tokio::test]
    async fn connect_assigns_icon_and_snapshot() {
        let shared: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::with_entries(vec![
            ChatEntry::user("bob", "🐶", "earlier"),
        ]));
        let session = join(" alice ", &shared).await;
        assert_eq!(session.username(), "alice");
        assert_eq!(session.icon(), icon_for("alice"));
        assert_eq!(session.view().len(), 1);
    }

    #[tokio::test]
    async fn post_lands_after_other_writers() {
        let shared = store();
        let mut alice = join("alice", &shared).await;
        let mut bob = join("bob", &shared).await;

        alice.post("hello from alice").await.unwrap();
        // bob's cache is stale; his post must not clobber alice's.
        bob.post("hello from bob").await.unwrap();

        let log = shared.read().unwrap();
        let contents: Vec<&str> = log.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["hello from alice", "hello from bob"]);
        assert_eq!(bob.view(), &log);
    }

    #[tokio::test]
    async fn empty_post_is_rejected() {
        let mut session = join("alice", &store()).await;
        assert!(matches!(
            session.post("  \n").await,
            Err(SessionError::EmptyMessage)
        ));
        assert!(session.view().is_empty());
    }

    #[tokio::test]
    async fn refresh_reports_changes() {
        let shared = store();
        let mut session = join("alice", &shared).await;
        assert!(!session.refresh().await.unwrap());
        shared.append(ChatEntry::user("bob", "🐶", "hi")).unwrap();
        assert!(session.refresh().await.unwrap());
        assert!(!session.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn older_snapshot_does_not_hide_own_post() {
        let shared = store();
        let mut session = join("alice", &shared).await;
        // A sync read taken before the post, delivered after it.
        let before_post = shared.read().unwrap();
        session.post("mine").await.unwrap();

        assert!(!session.apply(before_post));
        assert_eq!(session.view().len(), 1);
        assert_eq!(session.view().entries()[0].content, "mine");

        let mut newer = session.view().clone();
        newer.push(ChatEntry::user("bob", "🐶", "later"));
        assert!(session.apply(newer));
        assert_eq!(session.view().len(), 2);
    }

    #[tokio::test]
    async fn debug_output_hides_key() {
        let session = Session::connect(creds(Some("sk-topsecret"), Some("alice")), store())
            .await
            .unwrap();
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains("topsecret"));
    }
}
