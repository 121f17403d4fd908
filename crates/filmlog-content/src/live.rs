//! Live post snapshots pushed to a callback.

use std::time::Duration;

use filmlog_core::{LiveEntry, PrincipalId};
use filmlog_store::PostRepo;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub type SnapshotCallback = Box<dyn FnMut(Vec<LiveEntry>) + Send + 'static>;

/// A source of whole-collection snapshots for one owner.
pub trait LiveCollection: Send + Sync {
    /// Emit the current snapshot, then a fresh one after every change, in
    /// order, until the returned [`Subscription`] is dropped.
    fn subscribe(&self, owner: &PrincipalId, callback: SnapshotCallback) -> Subscription;
}

/// Handle to a running subscription. Dropping it stops emissions.
pub struct Subscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop emissions and wait for the task to wind down.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Live collection over the SQLite post table.
///
/// Refetches after every change committed through the repository and, for
/// writes made by other processes, whenever SQLite's `data_version` moves
/// between poll ticks.
pub struct StoreLiveCollection {
    repo: PostRepo,
    poll_interval: Duration,
}

impl StoreLiveCollection {
    pub fn new(repo: PostRepo, poll_interval: Duration) -> Self {
        Self {
            repo,
            poll_interval,
        }
    }
}

impl LiveCollection for StoreLiveCollection {
    fn subscribe(&self, owner: &PrincipalId, mut callback: SnapshotCallback) -> Subscription {
        let repo = self.repo.clone();
        let owner = owner.clone();
        let poll_interval = self.poll_interval;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        // Subscribe before the first fetch so no change slips in between.
        let mut changes = repo.subscribe_changes();

        let handle = tokio::spawn(async move {
            let mut last_version = repo.database().data_version().ok();
            emit(&repo, &owner, &mut callback);

            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let _ = ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) if change.owner() == &owner => emit(&repo, &owner, &mut callback),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "post changes lagged, refetching");
                            emit(&repo, &owner, &mut callback);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = ticker.tick() => match repo.database().data_version() {
                        Ok(version) if Some(version) != last_version => {
                            last_version = Some(version);
                            emit(&repo, &owner, &mut callback);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "data_version poll failed"),
                    },
                }
            }
            debug!(owner = %owner, "live subscription ended");
        });

        Subscription::new(cancel, handle)
    }
}

fn emit(repo: &PostRepo, owner: &PrincipalId, callback: &mut SnapshotCallback) {
    match repo.list_for_owner(owner) {
        Ok(posts) => {
            debug!(owner = %owner, count = posts.len(), "live snapshot");
            callback(posts);
        }
        Err(e) => error!(owner = %owner, error = %e, "live fetch failed"),
    }
}
