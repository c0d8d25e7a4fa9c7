// summary.rs - cached budget summary, guideline math, and the read models

use crate::api::{CategoryId, Query, TxId, TxKind};
use crate::dispatch::{Dispatcher, ReadError};
use crate::store::{SlotKey, SlotStore};
use crate::{Surface, UnixTimeMs, ViewHook, GUIDELINE_CRITICAL_PERCENT, GUIDELINE_WARN_PERCENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Budget settings as the service reports them. The salary key is camelCase
/// while the allocation keys are snake_case; both spellings are load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetSettings {
    #[serde(rename = "baseSalary", default)]
    pub base_salary: f64,
    #[serde(default)]
    pub alloc_fixed: f64,
    #[serde(default)]
    pub alloc_variable: f64,
    #[serde(default)]
    pub alloc_savings: f64,
    #[serde(default)]
    pub alloc_personal: f64,
}

impl BudgetSettings {
    #[must_use]
    pub fn allocation_percent(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::Fixed => self.alloc_fixed,
            Bucket::Variable => self.alloc_variable,
            Bucket::Savings => self.alloc_savings,
            Bucket::Personal => self.alloc_personal,
        }
    }
}

/// Spend accumulated this month per budget bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BucketTotals {
    #[serde(default)]
    pub fixed: f64,
    #[serde(default)]
    pub variable: f64,
    #[serde(default)]
    pub savings: f64,
    #[serde(default)]
    pub personal: f64,
}

impl BucketTotals {
    #[must_use]
    pub fn spent(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::Fixed => self.fixed,
            Bucket::Variable => self.variable,
            Bucket::Savings => self.savings,
            Bucket::Personal => self.personal,
        }
    }
}

/// The single cached projection of server aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SummarySnapshot {
    #[serde(default)]
    pub settings: BudgetSettings,
    #[serde(rename = "byCat", default)]
    pub by_cat: BucketTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Fixed,
    Variable,
    Savings,
    Personal,
}

impl Bucket {
    pub const ALL: [Self; 4] = [Self::Fixed, Self::Variable, Self::Savings, Self::Personal];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Variable => "variable",
            Self::Savings => "savings",
            Self::Personal => "personal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidelineLevel {
    Ok,
    Warn,
    Critical,
}

impl GuidelineLevel {
    #[must_use]
    pub fn for_percent(percent: u8) -> Self {
        if percent >= GUIDELINE_CRITICAL_PERCENT {
            Self::Critical
        } else if percent >= GUIDELINE_WARN_PERCENT {
            Self::Warn
        } else {
            Self::Ok
        }
    }
}

/// One guideline row: how much of a bucket's salary allocation is spent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetGuideline {
    pub bucket: Bucket,
    pub limit: f64,
    pub used: f64,
    pub percent: u8,
    pub level: GuidelineLevel,
}

/// Project the four guideline rows from a snapshot. Limits come from the base
/// salary times the allocation percentage; usage percent is capped at 100 and
/// collapses to 0 when the limit is not positive.
#[must_use]
pub fn guidelines(snapshot: &SummarySnapshot) -> Vec<BudgetGuideline> {
    Bucket::ALL
        .iter()
        .map(|&bucket| {
            let limit =
                snapshot.settings.base_salary * snapshot.settings.allocation_percent(bucket) / 100.0;
            let used = snapshot.by_cat.spent(bucket);
            let percent = if limit > 0.0 {
                ((used / limit) * 100.0).round().clamp(0.0, 100.0) as u8
            } else {
                0
            };
            BudgetGuideline {
                bucket,
                limit,
                used,
                percent,
                level: GuidelineLevel::for_percent(percent),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TxId>,
    pub timestamp: UnixTimeMs,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub category: String,
    pub amount: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MonthlyReport {
    #[serde(default)]
    pub income: f64,
    #[serde(default)]
    pub expense: f64,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(rename = "seriesIncome", default)]
    pub series_income: Vec<f64>,
    #[serde(rename = "seriesExpense", default)]
    pub series_expense: Vec<f64>,
}

impl MonthlyReport {
    #[must_use]
    pub fn balance(&self) -> f64 {
        self.income - self.expense
    }
}

/// Client-side filter over fetched transactions: substring match on the note,
/// exact category match, inclusive timestamp range. Empty fields match all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionFilter {
    pub text: Option<String>,
    pub category: Option<String>,
    pub from_ms: Option<u64>,
    pub to_ms: Option<u64>,
}

impl TransactionFilter {
    #[must_use]
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() {
                let note = tx.note.as_deref().unwrap_or_default().to_lowercase();
                if !note.contains(&needle) {
                    return false;
                }
            }
        }
        if let Some(category) = &self.category {
            if !category.is_empty() && tx.category != *category {
                return false;
            }
        }
        if let Some(from) = self.from_ms {
            if tx.timestamp.as_millis() < from {
                return false;
            }
        }
        if let Some(to) = self.to_ms {
            if tx.timestamp.as_millis() > to {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn apply(&self, rows: Vec<Transaction>) -> Vec<Transaction> {
        rows.into_iter().filter(|tx| self.matches(tx)).collect()
    }
}

/// The summary cache slot. Corrupt or unreadable content reads as absent;
/// writes are best-effort.
pub struct SummaryCache {
    slots: Arc<dyn SlotStore>,
    key: SlotKey,
}

impl SummaryCache {
    #[must_use]
    pub fn new(slots: Arc<dyn SlotStore>, key: SlotKey) -> Self {
        Self { slots, key }
    }

    pub async fn cached(&self) -> Option<SummarySnapshot> {
        let raw = match self.slots.read(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "summary cache unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "corrupt summary cache ignored");
                None
            }
        }
    }

    pub async fn store(&self, snapshot: &SummarySnapshot) {
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "summary snapshot not serializable");
                return;
            }
        };
        if let Err(err) = self.slots.write(&self.key, &raw).await {
            warn!(error = %err, "summary cache write failed");
        }
    }
}

/// Re-fetches the authoritative summary and keeps the cache slot current.
/// This path is called from UI-adjacent code and therefore never errors out;
/// a failed refresh leaves the stale cache in place and returns `None`.
pub struct Refresher {
    dispatcher: Arc<Dispatcher>,
    cache: SummaryCache,
    hook: Arc<dyn ViewHook>,
}

impl Refresher {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, cache: SummaryCache, hook: Arc<dyn ViewHook>) -> Self {
        Self {
            dispatcher,
            cache,
            hook,
        }
    }

    /// The stale snapshot, if one survived from an earlier session.
    pub async fn cached(&self) -> Option<SummarySnapshot> {
        self.cache.cached().await
    }

    /// Live fetch, cache write, view invalidation. Never serves the cache.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Option<SummarySnapshot> {
        let snapshot: SummarySnapshot = match self.dispatcher.fetch(Query::Summary).await {
            Ok(snapshot) => snapshot,
            Err(ReadError::Transport(err)) => {
                warn!(error = %err, "summary fetch failed, keeping stale cache");
                return None;
            }
            Err(ReadError::Malformed(err)) => {
                warn!(error = %err, "summary response malformed");
                return None;
            }
        };
        self.cache.store(&snapshot).await;
        self.hook.invalidate(Surface::Summary);
        Some(snapshot)
    }
}
