// ABOUTME: Sync loop — polls the shared history store and reports divergence from the cached view.
// ABOUTME: Runs as a tokio task with a fixed interval, an on-demand nudge, and a shutdown hook.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::room::HistoryLog;
use crate::store::{HistoryStore, run_blocking};

/// Events the sync loop reports to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The store differs from the last-seen copy; here is the fresh log.
    HistoryChanged(HistoryLog),
    /// Reading the store failed. The previous view is still the best known.
    Failed(String),
}

/// Owner of a running sync loop. Dropping it stops the loop.
pub struct SyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    nudge: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Ask for an immediate re-read instead of waiting for the next tick.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Start polling `store` every `interval`, diffing against `initial`.
///
/// The loop ends on [`SyncHandle::shutdown`], when the handle is dropped, or
/// when `events` is closed.
pub fn spawn_sync_loop(
    store: Arc<dyn HistoryStore>,
    initial: HistoryLog,
    interval: Duration,
    events: mpsc::Sender<SyncEvent>,
) -> SyncHandle {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let nudge = Arc::new(Notify::new());
    let loop_nudge = nudge.clone();

    let task = tokio::spawn(async move {
        let mut cached = initial;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the caller already has `initial`.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {}
                _ = loop_nudge.notified() => {}
            }

            let event = match run_blocking(&store, |s| s.read()).await {
                Ok(fresh) if fresh != cached => {
                    tracing::debug!(
                        previous = cached.len(),
                        current = fresh.len(),
                        "history diverged from cached view"
                    );
                    cached = fresh.clone();
                    SyncEvent::HistoryChanged(fresh)
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "history read failed during sync");
                    SyncEvent::Failed(e.to_string())
                }
            };

            if events.send(event).await.is_err() {
                break;
            }
        }
        tracing::debug!("sync loop stopped");
    });

    SyncHandle {
        shutdown: Some(shutdown_tx),
        nudge,
        task: Some(task),
    }
}
