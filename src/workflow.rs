// workflow.rs - purchase lists, list items, and the confirmation-gated
// purchase transition

use crate::api::{ApiError, ApiResponse, Command, IdempotencyKey, ItemId, ListId, Query};
use crate::dispatch::{Dispatcher, ReadError};
use crate::summary::Refresher;
use crate::{Surface, ViewHook};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Lifecycle of a single list item. Purchasing is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Purchased,
}

impl ItemStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Purchased => "purchased",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Purchased)
    }

    #[must_use]
    pub fn valid_transitions(self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::Purchased],
            Self::Purchased => vec![],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus);
        }
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalStatus {
                status: self.as_str(),
            });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a purchase list. Finishing is terminal and removes the list
/// from the open-lists read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    #[default]
    Open,
    Finished,
}

impl ListStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finished => "finished",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    #[must_use]
    pub fn valid_transitions(self) -> Vec<Self> {
        match self {
            Self::Open => vec![Self::Finished],
            Self::Finished => vec![],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus);
        }
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalStatus {
                status: self.as_str(),
            });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for ListStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot transition to the same status")]
    SameStatus,
    #[error("cannot transition from terminal status: {status}")]
    FromTerminalStatus { status: &'static str },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// One row of the open-lists read. `items` and `est_total` are aggregates the
/// service computes over the list's items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseList {
    pub id: ListId,
    pub name: String,
    #[serde(default)]
    pub status: ListStatus,
    #[serde(rename = "defaultCategory", default, skip_serializing_if = "Option::is_none")]
    pub default_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub items: u32,
    #[serde(rename = "estTotal", default)]
    pub est_total: f64,
}

fn qty_default() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default = "qty_default")]
    pub qty: f64,
    #[serde(rename = "estCost", default)]
    pub est_cost: f64,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(rename = "actualCost", default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// User input for a new list.
#[derive(Debug, Clone, Default)]
pub struct ListDraft {
    pub name: String,
    pub default_category: String,
    pub note: Option<String>,
}

/// User input for a new list item.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub name: String,
    pub qty: f64,
    pub est_cost: f64,
}

impl Default for ItemDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            qty: 1.0,
            est_cost: 0.0,
        }
    }
}

/// What the confirmation step collects before a purchase is issued.
#[derive(Debug, Clone, Default)]
pub struct PurchaseEntry {
    pub actual_cost: f64,
    pub category: String,
    pub note: Option<String>,
}

/// An armed purchase confirmation. Carries everything the confirmation UI
/// shows: the item, its owning list, and the list's default category to
/// preselect.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPurchase {
    pub item_id: ItemId,
    pub list_id: ListId,
    pub item_name: String,
    pub est_cost: f64,
    pub default_category: Option<String>,
}

/// Result of [`PurchaseWorkflow::create_list`]. Offline creation cannot hand
/// back a server id, so the caller learns which case it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateListOutcome {
    Created(ListId),
    Queued,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("unknown list: {0}")]
    UnknownList(ListId),
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    #[error("list {0} is not open")]
    ListNotOpen(ListId),
    #[error("no purchase confirmation is open")]
    NoOpenConfirmation,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Read(#[from] ReadError),
}

#[derive(Default)]
struct WorkflowState {
    lists: Vec<PurchaseList>,
    items: HashMap<ListId, Vec<ListItem>>,
    purchase_gate: Option<PendingPurchase>,
}

/// Drives list and item lifecycles against the service.
///
/// Holds the last-fetched open lists and their items so transitions can be
/// validated before a command goes out, plus the purchase gate: the purchase
/// transition never auto-advances, it is armed by [`begin_purchase`] and only
/// [`confirm_purchase`] dispatches the command. Rendering stays outside; the
/// view layer subscribes through [`ViewHook`].
///
/// [`begin_purchase`]: PurchaseWorkflow::begin_purchase
/// [`confirm_purchase`]: PurchaseWorkflow::confirm_purchase
pub struct PurchaseWorkflow {
    dispatcher: Arc<Dispatcher>,
    refresher: Arc<Refresher>,
    hook: Arc<dyn ViewHook>,
    state: RwLock<WorkflowState>,
}

impl PurchaseWorkflow {
    #[must_use]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        refresher: Arc<Refresher>,
        hook: Arc<dyn ViewHook>,
    ) -> Self {
        Self {
            dispatcher,
            refresher,
            hook,
            state: RwLock::new(WorkflowState::default()),
        }
    }

    /// Last-fetched open lists, without touching the network.
    pub async fn open_lists(&self) -> Vec<PurchaseList> {
        self.state.read().await.lists.clone()
    }

    /// Last-fetched items of one list. Empty when the list was never fetched
    /// or is no longer open.
    pub async fn items_of(&self, list_id: &ListId) -> Vec<ListItem> {
        self.state
            .read()
            .await
            .items
            .get(list_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn pending_purchase(&self) -> Option<PendingPurchase> {
        self.state.read().await.purchase_gate.clone()
    }

    /// Refetch the open lists and drop cached items of lists that are gone.
    #[instrument(skip(self))]
    pub async fn refresh_open_lists(&self) -> Result<Vec<PurchaseList>, WorkflowError> {
        let lists: Vec<PurchaseList> = self.dispatcher.fetch_rows(Query::ListOpenLists).await?;
        {
            let mut state = self.state.write().await;
            state
                .items
                .retain(|list_id, _| lists.iter().any(|l| l.id == *list_id));
            state.lists.clone_from(&lists);
        }
        self.hook.invalidate(Surface::Lists);
        Ok(lists)
    }

    #[instrument(skip(self), fields(list = %list_id))]
    pub async fn refresh_items(&self, list_id: &ListId) -> Result<Vec<ListItem>, WorkflowError> {
        let items: Vec<ListItem> = self
            .dispatcher
            .fetch_rows(Query::ListItems {
                list_id: list_id.clone(),
            })
            .await?;
        self.state
            .write()
            .await
            .items
            .insert(list_id.clone(), items.clone());
        self.hook.invalidate(Surface::Lists);
        Ok(items)
    }

    /// Create a new, empty, open list.
    ///
    /// Online, the server id comes back in [`CreateListOutcome::Created`].
    /// Offline the command is queued and the list only becomes visible once a
    /// flush delivers it and the open lists are refetched.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_list(&self, draft: ListDraft) -> Result<CreateListOutcome, WorkflowError> {
        let name = draft.name.trim().to_owned();
        if name.is_empty() {
            return Err(WorkflowError::Validation("list name cannot be empty".into()));
        }
        let default_category = draft.default_category.trim().to_owned();
        if default_category.is_empty() {
            return Err(WorkflowError::Validation(
                "a default category is required".into(),
            ));
        }

        let response = self
            .dispatcher
            .dispatch(Command::CreateList {
                key: IdempotencyKey::generate(),
                name,
                default_category,
                note: draft.note.filter(|n| !n.trim().is_empty()),
            })
            .await?;

        if response.is_offline() {
            return Ok(CreateListOutcome::Queued);
        }

        let id = response
            .id()
            .map(ListId::new)
            .ok_or(ApiError::MissingField("id"))?;
        if let Err(err) = self.refresh_open_lists().await {
            debug!(error = %err, "open lists not refetched after create");
        }
        info!(%id, "purchase list created");
        Ok(CreateListOutcome::Created(id))
    }

    /// Append a pending item to an open list.
    #[instrument(skip(self, draft), fields(list = %list_id, item = %draft.name))]
    pub async fn add_item(
        &self,
        list_id: &ListId,
        draft: ItemDraft,
    ) -> Result<ApiResponse, WorkflowError> {
        let name = draft.name.trim().to_owned();
        if name.is_empty() {
            return Err(WorkflowError::Validation("item name cannot be empty".into()));
        }
        if !draft.qty.is_finite() || draft.qty <= 0.0 {
            return Err(WorkflowError::Validation(
                "quantity must be greater than zero".into(),
            ));
        }
        if !draft.est_cost.is_finite() || draft.est_cost < 0.0 {
            return Err(WorkflowError::Validation(
                "estimated cost cannot be negative".into(),
            ));
        }

        // An unknown list may just mean the open set was never fetched.
        if self.lookup_list(list_id).await.is_none() {
            if let Err(err) = self.refresh_open_lists().await {
                debug!(error = %err, "open lists not refreshed before item add");
            }
        }
        let list = self
            .lookup_list(list_id)
            .await
            .ok_or_else(|| WorkflowError::UnknownList(list_id.clone()))?;
        if list.status != ListStatus::Open {
            return Err(WorkflowError::ListNotOpen(list_id.clone()));
        }

        let response = self
            .dispatcher
            .dispatch(Command::AddListItem {
                key: IdempotencyKey::generate(),
                list_id: list_id.clone(),
                name,
                qty: draft.qty,
                est_cost: draft.est_cost,
            })
            .await?;

        if !response.is_offline() {
            if let Err(err) = self.refresh_items(list_id).await {
                debug!(error = %err, "items not refetched after add");
            }
        }
        Ok(response)
    }

    /// Arm the purchase confirmation for a pending item of an open list.
    ///
    /// Nothing is dispatched here. The returned [`PendingPurchase`] is what
    /// the confirmation UI renders; a second call replaces the armed one the
    /// same way opening a new confirmation dismisses the previous.
    #[instrument(skip(self), fields(item = %item_id))]
    pub async fn begin_purchase(&self, item_id: &ItemId) -> Result<PendingPurchase, WorkflowError> {
        let mut state = self.state.write().await;

        let located = state.items.iter().find_map(|(list_id, items)| {
            items
                .iter()
                .find(|item| item.id == *item_id)
                .map(|item| (list_id.clone(), item.clone()))
        });
        let Some((list_id, item)) = located else {
            return Err(WorkflowError::UnknownItem(item_id.clone()));
        };

        let (list_status, default_category) = {
            let list = state
                .lists
                .iter()
                .find(|l| l.id == list_id)
                .ok_or_else(|| WorkflowError::UnknownList(list_id.clone()))?;
            (list.status, list.default_category.clone())
        };
        if list_status != ListStatus::Open {
            return Err(WorkflowError::ListNotOpen(list_id));
        }
        item.status.validate_transition(ItemStatus::Purchased)?;

        let pending = PendingPurchase {
            item_id: item.id,
            list_id,
            item_name: item.name,
            est_cost: item.est_cost,
            default_category,
        };
        state.purchase_gate = Some(pending.clone());
        Ok(pending)
    }

    /// Issue the armed purchase with the confirmed cost and category.
    ///
    /// A rejected entry leaves the confirmation armed so it can be corrected;
    /// a dispatched command consumes it. The service records the purchase and
    /// books the matching expense transaction, so a delivered confirm also
    /// refreshes the summary.
    #[instrument(skip(self, entry))]
    pub async fn confirm_purchase(
        &self,
        entry: PurchaseEntry,
    ) -> Result<ApiResponse, WorkflowError> {
        let category = entry.category.trim().to_owned();
        if category.is_empty() {
            return Err(WorkflowError::Validation("a category is required".into()));
        }
        if !entry.actual_cost.is_finite() || entry.actual_cost < 0.0 {
            return Err(WorkflowError::Validation(
                "actual cost must be zero or more".into(),
            ));
        }

        let pending = self
            .state
            .write()
            .await
            .purchase_gate
            .take()
            .ok_or(WorkflowError::NoOpenConfirmation)?;

        let command = Command::MarkItemPurchased {
            key: IdempotencyKey::generate(),
            item_id: pending.item_id.clone(),
            actual_cost: entry.actual_cost,
            category,
            note: entry.note.filter(|n| !n.trim().is_empty()),
        };
        let response = match self.dispatcher.dispatch(command).await {
            Ok(response) => response,
            Err(err) => {
                // re-arm so the confirmation is not lost to an encode failure
                self.state.write().await.purchase_gate = Some(pending);
                return Err(err.into());
            }
        };

        if response.is_offline() {
            debug!(item = %pending.item_id, "purchase queued, item stays pending until flushed");
        } else {
            if let Err(err) = self.refresh_items(&pending.list_id).await {
                debug!(error = %err, "items not refetched after purchase");
            }
            self.refresher.refresh().await;
        }
        Ok(response)
    }

    /// Dismiss the armed confirmation. The item stays pending and nothing is
    /// dispatched. Returns what was abandoned, if anything.
    pub async fn cancel_purchase(&self) -> Option<PendingPurchase> {
        self.state.write().await.purchase_gate.take()
    }

    /// Close an open list. Items are allowed to still be pending; they simply
    /// stay unpurchased on the finished list.
    #[instrument(skip(self), fields(list = %list_id))]
    pub async fn finish_list(&self, list_id: &ListId) -> Result<ApiResponse, WorkflowError> {
        let status = self
            .lookup_list(list_id)
            .await
            .ok_or_else(|| WorkflowError::UnknownList(list_id.clone()))?
            .status;
        status.validate_transition(ListStatus::Finished)?;

        let response = self
            .dispatcher
            .dispatch(Command::FinishList {
                key: IdempotencyKey::generate(),
                list_id: list_id.clone(),
            })
            .await?;

        if !response.is_offline() {
            if let Err(err) = self.refresh_open_lists().await {
                debug!(error = %err, "open lists not refetched after finish");
            }
            self.refresher.refresh().await;
        }
        Ok(response)
    }

    async fn lookup_list(&self, list_id: &ListId) -> Option<PurchaseList> {
        self.state
            .read()
            .await
            .lists
            .iter()
            .find(|l| l.id == *list_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CommandQueue;
    use crate::store::{MemorySlots, SlotKey, SlotStore};
    use crate::summary::SummaryCache;
    use crate::transport::{Transport, TransportError};
    use crate::NullHook;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubService {
        online: AtomicBool,
        responses: StdMutex<HashMap<String, Value>>,
        calls: StdMutex<Vec<Value>>,
    }

    impl Default for StubService {
        fn default() -> Self {
            Self {
                online: AtomicBool::new(true),
                responses: StdMutex::new(HashMap::new()),
                calls: StdMutex::new(Vec::new()),
            }
        }
    }

    impl StubService {
        fn respond(&self, action: &str, body: Value) {
            self.responses
                .lock()
                .unwrap()
                .insert(action.to_owned(), body);
        }

        fn set_online(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }

        fn actions_called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|body| body["action"].as_str().unwrap_or("?").to_owned())
                .collect()
        }

        fn body_of(&self, action: &str) -> Option<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|body| body["action"] == action)
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl Transport for StubService {
        async fn call(&self, body: &Value) -> Result<ApiResponse, TransportError> {
            self.calls.lock().unwrap().push(body.clone());
            if !self.online.load(Ordering::SeqCst) {
                return Err(TransportError::Unreachable("no network".into()));
            }
            let action = body["action"].as_str().unwrap_or_default();
            let canned = self.responses.lock().unwrap().get(action).cloned();
            Ok(ApiResponse::new(canned.unwrap_or_else(|| json!({ "ok": true }))))
        }
    }

    struct Rig {
        transport: Arc<StubService>,
        queue: Arc<CommandQueue>,
        workflow: PurchaseWorkflow,
    }

    fn rig() -> Rig {
        let transport = Arc::new(StubService::default());
        let slots: Arc<dyn SlotStore> = Arc::new(MemorySlots::new());
        let hook: Arc<dyn ViewHook> = Arc::new(NullHook);
        let queue = Arc::new(CommandQueue::new(
            Arc::clone(&slots),
            SlotKey::new(crate::QUEUE_SLOT_KEY).unwrap(),
            100,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&queue),
            Arc::clone(&hook),
        ));
        let cache = SummaryCache::new(
            Arc::clone(&slots),
            SlotKey::new(crate::SUMMARY_SLOT_KEY).unwrap(),
        );
        let refresher = Arc::new(Refresher::new(
            Arc::clone(&dispatcher),
            cache,
            Arc::clone(&hook),
        ));
        let workflow = PurchaseWorkflow::new(dispatcher, refresher, hook);
        Rig {
            transport,
            queue,
            workflow,
        }
    }

    fn seed_groceries(rig: &Rig) {
        rig.transport.respond(
            "listOpenLists",
            json!({ "ok": true, "data": [
                { "id": "l1", "name": "groceries", "defaultCategory": "variable",
                  "items": 2, "estTotal": 55.0 }
            ]}),
        );
        rig.transport.respond(
            "listItems",
            json!({ "ok": true, "data": [
                { "id": "i1", "name": "rice", "qty": 2, "estCost": 30.0, "status": "pending" },
                { "id": "i2", "name": "oil", "estCost": 25.0, "status": "purchased" }
            ]}),
        );
    }

    async fn seeded_rig() -> Rig {
        let rig = rig();
        seed_groceries(&rig);
        rig.workflow.refresh_open_lists().await.unwrap();
        rig.workflow
            .refresh_items(&ListId::new("l1"))
            .await
            .unwrap();
        rig
    }

    #[test]
    fn item_status_is_a_single_terminal_step() {
        assert_eq!(
            ItemStatus::Pending.valid_transitions(),
            [ItemStatus::Purchased]
        );
        assert!(ItemStatus::Purchased.valid_transitions().is_empty());
        assert!(ItemStatus::Pending.can_transition_to(ItemStatus::Purchased));
        assert!(ItemStatus::Pending
            .validate_transition(ItemStatus::Purchased)
            .is_ok());
        assert_eq!(
            ItemStatus::Purchased.validate_transition(ItemStatus::Pending),
            Err(TransitionError::FromTerminalStatus {
                status: "purchased"
            })
        );
        assert_eq!(
            ItemStatus::Pending.validate_transition(ItemStatus::Pending),
            Err(TransitionError::SameStatus)
        );
    }

    #[test]
    fn list_status_is_a_single_terminal_step() {
        assert_eq!(
            ListStatus::Open.valid_transitions(),
            [ListStatus::Finished]
        );
        assert!(ListStatus::Finished.valid_transitions().is_empty());
        assert!(ListStatus::Open
            .validate_transition(ListStatus::Finished)
            .is_ok());
        assert_eq!(
            ListStatus::Finished.validate_transition(ListStatus::Open),
            Err(TransitionError::FromTerminalStatus { status: "finished" })
        );
    }

    #[test]
    fn statuses_parse_from_the_wire() {
        let item: ListItem =
            serde_json::from_value(json!({ "id": "i1", "name": "rice", "status": "purchased" }))
                .unwrap();
        assert_eq!(item.status, ItemStatus::Purchased);
        assert_eq!(item.qty, 1.0);
        assert_eq!(item.est_cost, 0.0);

        let item: ListItem =
            serde_json::from_value(json!({ "id": "i2", "name": "oil" })).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn refresh_tracks_lists_and_prunes_stale_items() {
        let rig = seeded_rig().await;
        assert_eq!(rig.workflow.open_lists().await.len(), 1);
        assert_eq!(rig.workflow.items_of(&ListId::new("l1")).await.len(), 2);

        // the list disappears server-side; its cached items must go with it
        rig.transport
            .respond("listOpenLists", json!({ "ok": true, "data": [] }));
        rig.workflow.refresh_open_lists().await.unwrap();
        assert!(rig.workflow.open_lists().await.is_empty());
        assert!(rig.workflow.items_of(&ListId::new("l1")).await.is_empty());
    }

    #[tokio::test]
    async fn begin_purchase_arms_the_gate_for_pending_items_only() {
        let rig = seeded_rig().await;

        let pending = rig
            .workflow
            .begin_purchase(&ItemId::new("i1"))
            .await
            .unwrap();
        assert_eq!(pending.item_name, "rice");
        assert_eq!(pending.est_cost, 30.0);
        assert_eq!(pending.default_category.as_deref(), Some("variable"));
        assert!(rig.workflow.pending_purchase().await.is_some());

        let err = rig
            .workflow
            .begin_purchase(&ItemId::new("i2"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Transition(_)));

        let err = rig
            .workflow
            .begin_purchase(&ItemId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownItem(_)));
    }

    #[tokio::test]
    async fn cancelling_the_confirmation_dispatches_nothing() {
        let rig = seeded_rig().await;
        rig.workflow
            .begin_purchase(&ItemId::new("i1"))
            .await
            .unwrap();

        let abandoned = rig.workflow.cancel_purchase().await;
        assert_eq!(abandoned.unwrap().item_id, ItemId::new("i1"));
        assert!(rig.workflow.pending_purchase().await.is_none());

        let items = rig.workflow.items_of(&ListId::new("l1")).await;
        assert_eq!(items[0].status, ItemStatus::Pending);
        assert!(rig.transport.body_of("markItemPurchased").is_none());

        let err = rig
            .workflow
            .confirm_purchase(PurchaseEntry {
                actual_cost: 28.5,
                category: "variable".into(),
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NoOpenConfirmation));
    }

    #[tokio::test]
    async fn confirming_dispatches_the_purchase_and_refetches() {
        let rig = seeded_rig().await;
        rig.workflow
            .begin_purchase(&ItemId::new("i1"))
            .await
            .unwrap();

        rig.workflow
            .confirm_purchase(PurchaseEntry {
                actual_cost: 28.5,
                category: "variable".into(),
                note: Some("market".into()),
            })
            .await
            .unwrap();

        let body = rig.transport.body_of("markItemPurchased").unwrap();
        assert_eq!(body["itemId"], "i1");
        assert_eq!(body["actualCost"], 28.5);
        assert_eq!(body["category"], "variable");
        assert_eq!(body["note"], "market");
        assert_eq!(body["key"].as_str().map(str::len), Some(36));
        assert!(body.get("listId").is_none());

        let actions = rig.transport.actions_called();
        assert!(actions.iter().any(|a| a == "listItems"));
        assert!(actions.iter().any(|a| a == "summary"));
        assert!(rig.workflow.pending_purchase().await.is_none());
    }

    #[tokio::test]
    async fn bad_entry_keeps_the_confirmation_armed() {
        let rig = seeded_rig().await;
        rig.workflow
            .begin_purchase(&ItemId::new("i1"))
            .await
            .unwrap();

        let err = rig
            .workflow
            .confirm_purchase(PurchaseEntry {
                actual_cost: -3.0,
                category: "variable".into(),
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(rig.workflow.pending_purchase().await.is_some());
        assert!(rig.transport.body_of("markItemPurchased").is_none());
    }

    #[tokio::test]
    async fn offline_purchase_queues_and_item_stays_pending() {
        let rig = seeded_rig().await;
        rig.workflow
            .begin_purchase(&ItemId::new("i1"))
            .await
            .unwrap();
        rig.transport.set_online(false);

        let response = rig
            .workflow
            .confirm_purchase(PurchaseEntry {
                actual_cost: 28.5,
                category: "variable".into(),
                note: None,
            })
            .await
            .unwrap();
        assert!(response.is_offline());
        assert_eq!(rig.queue.len().await, 1);

        let items = rig.workflow.items_of(&ListId::new("l1")).await;
        assert_eq!(items[0].status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn create_list_returns_the_server_id_or_queues() {
        let rig = rig();
        rig.transport
            .respond("createList", json!({ "ok": true, "id": "l9" }));

        let outcome = rig
            .workflow
            .create_list(ListDraft {
                name: "  eid week  ".into(),
                default_category: "variable".into(),
                note: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, CreateListOutcome::Created(ListId::new("l9")));
        let body = rig.transport.body_of("createList").unwrap();
        assert_eq!(body["name"], "eid week");

        rig.transport.set_online(false);
        let outcome = rig
            .workflow
            .create_list(ListDraft {
                name: "later".into(),
                default_category: "variable".into(),
                note: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, CreateListOutcome::Queued);
        assert_eq!(rig.queue.len().await, 1);
    }

    #[tokio::test]
    async fn add_item_validates_input_and_owning_list() {
        let rig = rig();
        rig.transport
            .respond("listOpenLists", json!({ "ok": true, "data": [] }));

        let err = rig
            .workflow
            .add_item(&ListId::new("nope"), ItemDraft {
                name: "rice".into(),
                ..ItemDraft::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownList(_)));

        seed_groceries(&rig);
        rig.workflow.refresh_open_lists().await.unwrap();

        let err = rig
            .workflow
            .add_item(&ListId::new("l1"), ItemDraft {
                name: "   ".into(),
                ..ItemDraft::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let err = rig
            .workflow
            .add_item(&ListId::new("l1"), ItemDraft {
                name: "rice".into(),
                qty: 0.0,
                est_cost: 0.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        rig.workflow
            .add_item(&ListId::new("l1"), ItemDraft {
                name: "rice".into(),
                qty: 2.0,
                est_cost: 30.0,
            })
            .await
            .unwrap();
        let body = rig.transport.body_of("addListItem").unwrap();
        assert_eq!(body["listId"], "l1");
        assert_eq!(body["estCost"], 30.0);
    }

    #[tokio::test]
    async fn finish_list_removes_it_from_the_open_set() {
        let rig = seeded_rig().await;

        rig.transport
            .respond("listOpenLists", json!({ "ok": true, "data": [] }));
        rig.workflow
            .finish_list(&ListId::new("l1"))
            .await
            .unwrap();
        assert!(rig.transport.body_of("finishList").is_some());
        assert!(rig.workflow.open_lists().await.is_empty());
        assert!(rig.workflow.items_of(&ListId::new("l1")).await.is_empty());

        let err = rig
            .workflow
            .finish_list(&ListId::new("l1"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownList(_)));
    }
}
