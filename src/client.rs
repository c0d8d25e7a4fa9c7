// client.rs - wires the queue, interceptor, refresher, flusher, and purchase
// workflow into one facade the host UI talks to

use crate::api::{ApiError, ApiResponse, CategoryId, Command, IdempotencyKey, Query, TxId, TxKind};
use crate::dispatch::{Dispatcher, ReadError};
use crate::flush::{FlushCoordinator, FlushOutcome};
use crate::queue::{CommandQueue, QueuedCommand};
use crate::store::{SlotKey, SlotStore, StoreError};
use crate::summary::{
    guidelines, BudgetGuideline, Category, MonthlyReport, Refresher, SummaryCache,
    SummarySnapshot, Transaction, TransactionFilter,
};
use crate::transport::Transport;
use crate::workflow::PurchaseWorkflow;
use crate::{
    Surface, UnixTimeMs, ViewHook, DEFAULT_CATEGORY_COLOR, DEFAULT_MAX_QUEUED, QUEUE_SLOT_KEY,
    SUMMARY_SLOT_KEY,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

fn default_queue_slot() -> String {
    QUEUE_SLOT_KEY.to_owned()
}

fn default_summary_slot() -> String {
    SUMMARY_SLOT_KEY.to_owned()
}

fn default_max_queued() -> usize {
    DEFAULT_MAX_QUEUED
}

/// Storage layout and queue limits. The defaults match the slots the shipped
/// app has always used, so an upgraded install keeps its queued commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_queue_slot")]
    pub queue_slot: String,
    #[serde(default = "default_summary_slot")]
    pub summary_slot: String,
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_slot: default_queue_slot(),
            summary_slot: default_summary_slot(),
            max_queued: default_max_queued(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        SlotKey::new(&self.queue_slot)?;
        SlotKey::new(&self.summary_slot)?;
        if self.max_queued == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.queue_slot == self.summary_slot {
            return Err(ConfigError::SharedSlot);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid slot key: {0}")]
    Slot(#[from] StoreError),
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("queue and summary slots must differ")]
    SharedSlot,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("no delete confirmation is open")]
    NoOpenConfirmation,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// User input for a new transaction.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub amount: f64,
    pub kind: TxKind,
    pub category: String,
    pub note: Option<String>,
    pub date: Option<String>,
}

/// User input for a new category.
#[derive(Debug, Clone)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
    pub icon: String,
    pub enabled: bool,
}

impl Default for CategoryDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_owned(),
            icon: String::new(),
            enabled: true,
        }
    }
}

/// An armed delete confirmation, carrying what the confirm dialog shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelete {
    pub id: TxId,
    pub category: String,
    pub amount: f64,
    pub timestamp: UnixTimeMs,
}

/// What [`SyncClient::start`] did on page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// A cached summary existed and was surfaced before any network work.
    pub cached: bool,
    /// The live summary fetch succeeded.
    pub fresh: bool,
    /// Result of the startup drain of the offline queue.
    pub flush: FlushOutcome,
}

/// The one object the host embeds.
///
/// Owns the whole offline-resilient pipeline: commands go through the
/// interceptor and fall back to the persistent queue, reads go straight to
/// the transport, and the connectivity and focus triggers drain the queue.
pub struct SyncClient {
    config: SyncConfig,
    hook: Arc<dyn ViewHook>,
    queue: Arc<CommandQueue>,
    dispatcher: Arc<Dispatcher>,
    refresher: Arc<Refresher>,
    flusher: Arc<FlushCoordinator>,
    workflow: Arc<PurchaseWorkflow>,
    delete_gate: Mutex<Option<PendingDelete>>,
}

impl SyncClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        slots: Arc<dyn SlotStore>,
        hook: Arc<dyn ViewHook>,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue_key = SlotKey::new(&config.queue_slot)?;
        let summary_key = SlotKey::new(&config.summary_slot)?;

        let queue = Arc::new(CommandQueue::new(
            Arc::clone(&slots),
            queue_key,
            config.max_queued,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&transport),
            Arc::clone(&queue),
            Arc::clone(&hook),
        ));
        let cache = SummaryCache::new(slots, summary_key);
        let refresher = Arc::new(Refresher::new(
            Arc::clone(&dispatcher),
            cache,
            Arc::clone(&hook),
        ));
        let flusher = Arc::new(FlushCoordinator::new(
            transport,
            Arc::clone(&queue),
            Arc::clone(&refresher),
            Arc::clone(&hook),
        ));
        let workflow = Arc::new(PurchaseWorkflow::new(
            Arc::clone(&dispatcher),
            Arc::clone(&refresher),
            Arc::clone(&hook),
        ));

        Ok(Self {
            config,
            hook,
            queue,
            dispatcher,
            refresher,
            flusher,
            workflow,
            delete_gate: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn workflow(&self) -> &PurchaseWorkflow {
        &self.workflow
    }

    /// Page-load sequence: surface the cached summary first so something
    /// paints immediately, then fetch live, then drain anything queued from
    /// the previous session.
    #[instrument(skip(self))]
    pub async fn start(&self) -> StartReport {
        let cached = self.refresher.cached().await.is_some();
        if cached {
            self.hook.invalidate(Surface::Summary);
        }
        let fresh = self.refresher.refresh().await.is_some();
        let flush = self.flusher.flush().await;
        info!(cached, fresh, ?flush, "client started");
        StartReport {
            cached,
            fresh,
            flush,
        }
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    /// Connectivity came back; drain the queue.
    pub async fn on_connectivity_restored(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    /// The app window regained focus; drain the queue.
    pub async fn on_foregrounded(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    /// User-initiated refresh: drain the queue, then refetch the summary
    /// unconditionally, even when the flush had nothing to do.
    pub async fn on_manual_refresh(&self) -> Option<SummarySnapshot> {
        self.flusher.flush().await;
        self.refresher.refresh().await
    }

    pub async fn cached_summary(&self) -> Option<SummarySnapshot> {
        self.refresher.cached().await
    }

    pub async fn refresh_summary(&self) -> Option<SummarySnapshot> {
        self.refresher.refresh().await
    }

    /// Budget guideline bars computed from the cached summary.
    pub async fn budget_guidelines(&self) -> Vec<BudgetGuideline> {
        match self.refresher.cached().await {
            Some(snapshot) => guidelines(&snapshot),
            None => Vec::new(),
        }
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.len().await
    }

    pub async fn queued_commands(&self) -> Vec<QueuedCommand> {
        self.queue.load().await
    }

    /// Record an income or expense. Delivered or queued, the caller gets an
    /// accepted response; a delivered one also refreshes the summary.
    #[instrument(skip(self, draft), fields(kind = draft.kind.name(), category = %draft.category))]
    pub async fn add_transaction(
        &self,
        draft: TransactionDraft,
    ) -> Result<ApiResponse, ClientError> {
        let category = draft.category.trim().to_owned();
        if category.is_empty() {
            return Err(ClientError::Validation("a category is required".into()));
        }
        if !draft.amount.is_finite() || draft.amount <= 0.0 {
            return Err(ClientError::Validation(
                "amount must be greater than zero".into(),
            ));
        }

        let response = self
            .dispatcher
            .dispatch(Command::AddTransaction {
                key: IdempotencyKey::generate(),
                amount: draft.amount,
                kind: draft.kind,
                category,
                note: draft.note.filter(|n| !n.trim().is_empty()),
                date: draft.date,
            })
            .await?;

        if !response.is_offline() {
            self.refresher.refresh().await;
            self.hook.invalidate(Surface::Transactions);
        }
        Ok(response)
    }

    /// Arm the delete confirmation for a listed transaction.
    pub async fn begin_delete(&self, tx: &Transaction) -> Result<PendingDelete, ClientError> {
        let Some(id) = tx.id.clone() else {
            return Err(ClientError::Validation(
                "transaction has no id to delete".into(),
            ));
        };
        let pending = PendingDelete {
            id,
            category: tx.category.clone(),
            amount: tx.amount,
            timestamp: tx.timestamp,
        };
        *self.delete_gate.lock().await = Some(pending.clone());
        Ok(pending)
    }

    #[instrument(skip(self))]
    pub async fn confirm_delete(&self) -> Result<ApiResponse, ClientError> {
        let pending = self
            .delete_gate
            .lock()
            .await
            .take()
            .ok_or(ClientError::NoOpenConfirmation)?;

        let command = Command::DeleteTransaction {
            key: IdempotencyKey::generate(),
            id: pending.id.clone(),
        };
        let response = match self.dispatcher.dispatch(command).await {
            Ok(response) => response,
            Err(err) => {
                *self.delete_gate.lock().await = Some(pending);
                return Err(err.into());
            }
        };

        if !response.is_offline() {
            self.refresher.refresh().await;
            self.hook.invalidate(Surface::Transactions);
        }
        Ok(response)
    }

    /// Dismiss the armed delete. Nothing is dispatched.
    pub async fn cancel_delete(&self) -> Option<PendingDelete> {
        self.delete_gate.lock().await.take()
    }

    pub async fn pending_delete(&self) -> Option<PendingDelete> {
        self.delete_gate.lock().await.clone()
    }

    /// All transactions, newest last, narrowed by the filter.
    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ClientError> {
        let rows: Vec<Transaction> = self.dispatcher.fetch_rows(Query::Transactions).await?;
        Ok(filter.apply(rows))
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn add_category(&self, draft: CategoryDraft) -> Result<ApiResponse, ClientError> {
        let name = draft.name.trim().to_owned();
        if name.is_empty() {
            return Err(ClientError::Validation("category name cannot be empty".into()));
        }
        let color = if draft.color.trim().is_empty() {
            DEFAULT_CATEGORY_COLOR.to_owned()
        } else {
            draft.color
        };

        let response = self
            .dispatcher
            .dispatch(Command::AddCategory {
                key: IdempotencyKey::generate(),
                name,
                color,
                icon: draft.icon,
                enabled: draft.enabled,
            })
            .await?;

        if !response.is_offline() {
            self.hook.invalidate(Surface::Categories);
        }
        Ok(response)
    }

    /// Categories in use cannot be deleted, only disabled.
    #[instrument(skip(self), fields(category = %id))]
    pub async fn set_category_enabled(
        &self,
        id: &CategoryId,
        enabled: bool,
    ) -> Result<ApiResponse, ClientError> {
        let response = self
            .dispatcher
            .dispatch(Command::UpdateCategory {
                key: IdempotencyKey::generate(),
                id: id.clone(),
                enabled,
            })
            .await?;

        if !response.is_offline() {
            self.hook.invalidate(Surface::Categories);
        } else {
            debug!(category = %id, "category update queued");
        }
        Ok(response)
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ClientError> {
        Ok(self.dispatcher.fetch_rows(Query::ListCategories).await?)
    }

    /// Enabled categories only, the set offered when entering a transaction.
    pub async fn enabled_categories(&self) -> Result<Vec<Category>, ClientError> {
        let mut categories = self.categories().await?;
        categories.retain(|c| c.enabled);
        Ok(categories)
    }

    pub async fn monthly_report(&self) -> Result<MonthlyReport, ClientError> {
        Ok(self.dispatcher.fetch(Query::MonthlyReport).await?)
    }
}
