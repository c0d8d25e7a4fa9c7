// queue.rs - durable FIFO of commands awaiting replay

use crate::store::{SlotKey, SlotStore, StoreError};
use crate::UnixTimeMs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// One queued mutation: the moment it was deferred plus the exact wire body
/// to replay. Entries are immutable; replay rebuilds the stored list instead
/// of editing entries in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub when: UnixTimeMs,
    pub payload: Value,
}

impl QueuedCommand {
    #[must_use]
    pub fn action(&self) -> &str {
        self.payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

/// The persistent queue. All read-modify-write sequences are serialized
/// behind one lock so an append can never interleave with a replay commit.
pub struct CommandQueue {
    slots: Arc<dyn SlotStore>,
    key: SlotKey,
    max_queued: usize,
    rmw: Mutex<()>,
    now_ms: fn() -> u64,
}

impl CommandQueue {
    #[must_use]
    pub fn new(slots: Arc<dyn SlotStore>, key: SlotKey, max_queued: usize) -> Self {
        Self {
            slots,
            key,
            max_queued,
            rmw: Mutex::new(()),
            now_ms: crate::now_ms,
        }
    }

    /// Test hook: pin the clock used to stamp `when`.
    #[must_use]
    pub fn with_clock(mut self, now_ms: fn() -> u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    /// Current queue contents. An absent, unreadable, or corrupt slot is the
    /// empty queue; the caller never sees a storage error from here.
    pub async fn load(&self) -> Vec<QueuedCommand> {
        match self.try_load().await {
            Ok(commands) => commands,
            Err(err) => {
                warn!(error = %err, "queue slot unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.load().await.is_empty()
    }

    /// Append a command body, stamping it with the current time.
    #[instrument(skip(self, payload))]
    pub async fn append(&self, payload: Value) -> Result<usize, StoreError> {
        let _guard = self.rmw.lock().await;

        let mut commands = self.try_load().await?;
        if commands.len() >= self.max_queued {
            return Err(StoreError::QueueFull {
                capacity: self.max_queued,
            });
        }
        commands.push(QueuedCommand {
            when: UnixTimeMs((self.now_ms)()),
            payload,
        });
        self.save(&commands).await?;
        debug!(depth = commands.len(), "command queued");
        Ok(commands.len())
    }

    /// Persist the result of replaying a snapshot of `snapshot_len` entries.
    ///
    /// Entries appended while the replay ran sit past the snapshot boundary;
    /// they are carried over untouched so the next flush picks them up. The
    /// write happens even when nothing is retained: that is what durably
    /// removes delivered commands.
    #[instrument(skip(self, still_pending), fields(retained = still_pending.len()))]
    pub async fn commit_replay(
        &self,
        snapshot_len: usize,
        still_pending: Vec<QueuedCommand>,
    ) -> Result<usize, StoreError> {
        let _guard = self.rmw.lock().await;

        let current = self.try_load().await?;
        let tail = if current.len() > snapshot_len {
            current[snapshot_len..].to_vec()
        } else {
            Vec::new()
        };
        if !tail.is_empty() {
            debug!(tail = tail.len(), "preserving commands enqueued mid-flush");
        }

        let mut next = still_pending;
        next.extend(tail);
        self.save(&next).await?;
        Ok(next.len())
    }

    async fn try_load(&self) -> Result<Vec<QueuedCommand>, StoreError> {
        let Some(raw) = self.slots.read(&self.key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(commands) => Ok(commands),
            Err(err) => {
                warn!(error = %err, "corrupt queue payload dropped");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, commands: &[QueuedCommand]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(commands)?;
        self.slots.write(&self.key, &raw).await
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("key", &self.key)
            .field("max_queued", &self.max_queued)
            .finish_non_exhaustive()
    }
}
