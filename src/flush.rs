// flush.rs - single-flight replay of the offline queue

use crate::queue::CommandQueue;
use crate::summary::Refresher;
use crate::transport::Transport;
use crate::{Notice, ViewHook, NOTICE_SYNCED};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// What a `flush()` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty; nothing was touched.
    Idle,
    /// Another flush already held the in-flight guard.
    Skipped,
    /// A snapshot was replayed.
    Completed(FlushReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Snapshot size at the start of the replay.
    pub attempted: usize,
    /// Commands the service accepted.
    pub delivered: usize,
    /// Commands that failed again and stay queued.
    pub retained: usize,
    /// Whether the summary refresh was triggered.
    pub refreshed: bool,
}

/// Drains the queue against the transport directly, bypassing the
/// interceptor so a replay failure lands back in the queue by way of the
/// commit instead of re-entering the dispatch path.
pub struct FlushCoordinator {
    transport: Arc<dyn Transport>,
    queue: Arc<CommandQueue>,
    refresher: Arc<Refresher>,
    hook: Arc<dyn ViewHook>,
    in_flight: Mutex<()>,
}

impl FlushCoordinator {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        queue: Arc<CommandQueue>,
        refresher: Arc<Refresher>,
        hook: Arc<dyn ViewHook>,
    ) -> Self {
        Self {
            transport,
            queue,
            refresher,
            hook,
            in_flight: Mutex::new(()),
        }
    }

    /// Replay the current queue snapshot in FIFO order.
    ///
    /// The snapshot loaded here is the whole unit of work: commands enqueued
    /// while the replay runs are left for the next invocation. Overlapping
    /// calls do not wait; the loser returns [`FlushOutcome::Skipped`] so
    /// close-together connectivity and focus triggers cannot double-replay.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> FlushOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("flush already in flight, skipping");
            return FlushOutcome::Skipped;
        };

        let snapshot = self.queue.load().await;
        if snapshot.is_empty() {
            return FlushOutcome::Idle;
        }

        let attempted = snapshot.len();
        let mut still_pending = Vec::new();
        for entry in &snapshot {
            match self.transport.call(&entry.payload).await {
                Ok(_) => {
                    debug!(action = entry.action(), "queued command delivered");
                }
                Err(err) => {
                    debug!(action = entry.action(), error = %err, "replay failed, retaining");
                    still_pending.push(entry.clone());
                }
            }
        }

        let retained = still_pending.len();
        let delivered = attempted - retained;

        if let Err(err) = self.queue.commit_replay(attempted, still_pending).await {
            warn!(error = %err, "flush result not persisted");
        }

        let mut refreshed = false;
        if delivered > 0 {
            info!(delivered, retained, "flush made progress");
            self.hook.notice(Notice::success(NOTICE_SYNCED));
            self.refresher.refresh().await;
            refreshed = true;
        }

        FlushOutcome::Completed(FlushReport {
            attempted,
            delivered,
            retained,
            refreshed,
        })
    }
}
