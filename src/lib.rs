// lib.rs - offline-resilient command queue and sync core for the Masrofati
// expense tracker

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod api;
pub mod client;
pub mod dispatch;
pub mod flush;
pub mod queue;
pub mod store;
pub mod summary;
pub mod transport;
pub mod workflow;

use serde::{Deserialize, Serialize};

pub use api::{ApiError, ApiResponse, Command, IdempotencyKey, Query, TxKind};
pub use client::{ClientError, ConfigError, StartReport, SyncClient, SyncConfig};
pub use dispatch::{Dispatcher, ReadError};
pub use flush::{FlushCoordinator, FlushOutcome, FlushReport};
pub use queue::{CommandQueue, QueuedCommand};
pub use store::{FileSlots, MemorySlots, SlotKey, SlotStore, StoreError};
pub use summary::{Refresher, SummarySnapshot};
pub use transport::{Transport, TransportError};
pub use workflow::{PurchaseWorkflow, TransitionError, WorkflowError};

pub const SUMMARY_SLOT_KEY: &str = "mx_summary_cache_v1";
pub const QUEUE_SLOT_KEY: &str = "mx_queue_v2";
pub const DEFAULT_MAX_QUEUED: usize = 1000;
pub const GUIDELINE_WARN_PERCENT: u8 = 70;
pub const GUIDELINE_CRITICAL_PERCENT: u8 = 90;
pub const DEFAULT_CATEGORY_COLOR: &str = "#64748b";

pub const NOTICE_QUEUED_OFFLINE: &str = "Scheduled offline. Will be sent later.";
pub const NOTICE_QUEUE_UNAVAILABLE: &str = "Could not save the request for later delivery.";
pub const NOTICE_SYNCED: &str = "Offline changes delivered.";

#[must_use]
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(now_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    #[must_use]
    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[must_use]
    pub fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl Default for UnixTimeMs {
    fn default() -> Self {
        Self::now()
    }
}

/// A transient message for the user, shown by the view layer and dismissed
/// after its duration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

impl Notice {
    #[must_use]
    pub fn new(text: impl Into<String>, kind: NoticeKind) -> Self {
        Self {
            text: text.into(),
            kind,
            created_at_ms: now_ms(),
            duration_ms: kind.default_duration_ms(),
        }
    }

    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, NoticeKind::Info)
    }

    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, NoticeKind::Success)
    }

    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, NoticeKind::Warning)
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    #[default]
    Info,
    Success,
    Warning,
}

impl NoticeKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
        }
    }
}

/// A view region whose rendered data went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Summary,
    Transactions,
    Categories,
    Lists,
}

/// How the core talks back to the embedding view layer.
///
/// The core never renders; it announces notices and marks surfaces stale, and
/// the host re-renders on its own schedule. Both methods default to no-ops so
/// headless embedders implement nothing.
pub trait ViewHook: Send + Sync {
    fn notice(&self, notice: Notice) {
        let _ = notice;
    }

    fn invalidate(&self, surface: Surface) {
        let _ = surface;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullHook;

impl ViewHook for NullHook {}
