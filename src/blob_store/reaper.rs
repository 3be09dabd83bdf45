//! Cleanup for orphaned blobs.
//!
//! Redemption sends the URLs of blobs that were uploaded but never attached
//! to a token through an [`OrphanQueue`]. The [`OrphanReaper`] runs as a
//! background task and periodically deletes whatever has been queued.
//! Failed deletions are logged and dropped; an external bucket sweep is
//! the backstop for anything the reaper misses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::BlobStore;

/// Create a connected queue and reaper for `store`.
pub fn orphan_channel(store: Arc<dyn BlobStore>) -> (OrphanQueue, OrphanReaper) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OrphanQueue { tx },
        OrphanReaper {
            store,
            rx,
            interval: Duration::from_secs(30),
        },
    )
}

/// Sending half: schedules blobs for deletion.
#[derive(Clone)]
pub struct OrphanQueue {
    tx: UnboundedSender<String>,
}

impl OrphanQueue {
    /// Schedule `urls` for deletion. Never blocks.
    pub fn schedule<I>(&self, urls: I, reason: &'static str)
    where
        I: IntoIterator<Item = String>,
    {
        for url in urls {
            info!(url = %url, reason, "Scheduling orphaned blob for cleanup");
            if let Err(e) = self.tx.send(url) {
                warn!(url = %e.0, "Orphan reaper is gone, blob left for external sweep");
            }
        }
    }
}

/// Background task that deletes queued orphaned blobs.
pub struct OrphanReaper {
    store: Arc<dyn BlobStore>,
    rx: UnboundedReceiver<String>,
    interval: Duration,
}

impl OrphanReaper {
    /// Set custom sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the reaper as a background task.
    ///
    /// The task ends once every [`OrphanQueue`] has been dropped and the
    /// queue is empty.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let (deleted, open) = self.drain().await;
                if deleted > 0 {
                    info!(deleted, "Orphan reaper cleaned up blobs");
                }
                if !open {
                    break;
                }
            }
        })
    }

    /// Delete everything currently queued (for testing or manual invocation).
    ///
    /// Returns the number of blobs deleted.
    pub async fn run_once(&mut self) -> usize {
        self.drain().await.0
    }

    async fn drain(&mut self) -> (usize, bool) {
        let mut deleted = 0;
        loop {
            match self.rx.try_recv() {
                Ok(url) => match self.store.delete(&url).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to delete orphaned blob");
                    }
                },
                Err(TryRecvError::Empty) => return (deleted, true),
                Err(TryRecvError::Disconnected) => return (deleted, false),
            }
        }
    }
}
