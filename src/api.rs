// api.rs - wire vocabulary shared with the remote service

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id!(
    /// Server-assigned transaction identifier.
    TxId
);
typed_id!(CategoryId);
typed_id!(
    /// Server-assigned purchase-list identifier.
    ListId
);
typed_id!(ItemId);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid idempotency key: {0}")]
    InvalidKey(String),
    #[error("could not encode request body: {0}")]
    Encode(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response missing field {0:?}")]
    MissingField(&'static str),
}

/// Client-generated deduplication key carried by every mutating command.
///
/// The key travels with the command into the offline queue and back out on
/// replay, so a command delivered both manually and by an automatic flush
/// reaches the server with the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    const MAX_LENGTH: usize = 64;

    pub fn new(key: impl Into<String>) -> Result<Self, ApiError> {
        let key = key.into().trim().to_string();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), ApiError> {
        if key.is_empty() {
            return Err(ApiError::InvalidKey("key cannot be empty".into()));
        }
        if key.len() > Self::MAX_LENGTH {
            return Err(ApiError::InvalidKey(format!(
                "key exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ApiError::InvalidKey(
                "key contains invalid characters (allowed: a-z, A-Z, 0-9, -, _)".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Income,
    Expense,
}

impl TxKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

/// A mutating request. Every variant serializes to the exact body the service
/// accepts, tagged by `action`; reads live in [`Query`] so the type system
/// keeps them out of the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    AddTransaction {
        key: IdempotencyKey,
        amount: f64,
        #[serde(rename = "type")]
        kind: TxKind,
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<String>,
    },
    DeleteTransaction {
        key: IdempotencyKey,
        id: TxId,
    },
    AddCategory {
        key: IdempotencyKey,
        name: String,
        color: String,
        icon: String,
        enabled: bool,
    },
    UpdateCategory {
        key: IdempotencyKey,
        id: CategoryId,
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    CreateList {
        key: IdempotencyKey,
        name: String,
        default_category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AddListItem {
        key: IdempotencyKey,
        list_id: ListId,
        name: String,
        qty: f64,
        est_cost: f64,
    },
    #[serde(rename_all = "camelCase")]
    MarkItemPurchased {
        key: IdempotencyKey,
        item_id: ItemId,
        actual_cost: f64,
        category: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FinishList {
        key: IdempotencyKey,
        list_id: ListId,
    },
}

impl Command {
    /// Wire action name, as it appears in the serialized `action` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddTransaction { .. } => "addTransaction",
            Self::DeleteTransaction { .. } => "deleteTransaction",
            Self::AddCategory { .. } => "addCategory",
            Self::UpdateCategory { .. } => "updateCategory",
            Self::CreateList { .. } => "createList",
            Self::AddListItem { .. } => "addListItem",
            Self::MarkItemPurchased { .. } => "markItemPurchased",
            Self::FinishList { .. } => "finishList",
        }
    }

    #[must_use]
    pub fn key(&self) -> &IdempotencyKey {
        match self {
            Self::AddTransaction { key, .. }
            | Self::DeleteTransaction { key, .. }
            | Self::AddCategory { key, .. }
            | Self::UpdateCategory { key, .. }
            | Self::CreateList { key, .. }
            | Self::AddListItem { key, .. }
            | Self::MarkItemPurchased { key, .. }
            | Self::FinishList { key, .. } => key,
        }
    }

    pub fn to_body(&self) -> Result<Value, ApiError> {
        serde_json::to_value(self).map_err(|e| ApiError::Encode(e.to_string()))
    }
}

/// A read request. Reads are never queued; a failed read surfaces to the
/// caller instead of masquerading as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Summary,
    Transactions,
    ListCategories,
    ListOpenLists,
    ListItems { list_id: ListId },
    MonthlyReport,
}

impl Query {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Transactions => "transactions",
            Self::ListCategories => "listCategories",
            Self::ListOpenLists => "listOpenLists",
            Self::ListItems { .. } => "listItems",
            Self::MonthlyReport => "monthlyReport",
        }
    }

    #[must_use]
    pub fn to_body(&self) -> Value {
        match self {
            Self::ListItems { list_id } => {
                json!({ "action": "listItems", "listId": list_id.as_str() })
            }
            other => json!({ "action": other.name() }),
        }
    }
}

/// Raw service response. Successful mutations carry `{"ok": true, ...}`;
/// reads carry their rows under `data` or a whole-body projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiResponse(Value);

impl ApiResponse {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The synthetic response handed back for a command that was queued
    /// instead of delivered.
    #[must_use]
    pub fn offline() -> Self {
        Self(json!({ "ok": true, "offline": true }))
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.0
            .get("offline")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.0.get("ok").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Server-assigned id, present on creation responses.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Rows under the `data` key. A response without `data` is an empty set,
    /// matching how the service shapes its list reads.
    pub fn rows<T: DeserializeOwned>(&self) -> Result<Vec<T>, ApiError> {
        let Some(data) = self.0.get("data") else {
            return Ok(Vec::new());
        };
        serde_json::from_value(data.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Whole-body projection for reads that are not row-shaped.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.0.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}
