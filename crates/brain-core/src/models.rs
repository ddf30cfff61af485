//! Domain records supplied by the surrounding application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evolution::EvolutionReason;

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "income" | "credit" => Ok(Self::Income),
            "expense" | "debit" => Ok(Self::Expense),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How discretionary spending in a category is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendingNature {
    /// Rent, groceries, utilities
    Essential,
    /// Nice to have (dining out, streaming)
    Comfort,
    /// Avoidable spending
    Superfluous,
}

impl SpendingNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Comfort => "comfort",
            Self::Superfluous => "superfluous",
        }
    }
}

impl std::str::FromStr for SpendingNature {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "essential" => Ok(Self::Essential),
            "comfort" => Ok(Self::Comfort),
            "superfluous" => Ok(Self::Superfluous),
            _ => Err(format!("Unknown spending nature: {}", s)),
        }
    }
}

impl std::fmt::Display for SpendingNature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single transaction as seen by the brain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Amount in cents; the sign is ignored, `kind` carries direction
    pub amount_cents: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Epoch milliseconds, bucketed into months in UTC
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superfluous: Option<bool>,
}

impl Transaction {
    pub fn income(amount_cents: i64, timestamp_ms: i64, category_id: impl Into<String>) -> Self {
        Self {
            amount_cents,
            kind: TransactionType::Income,
            timestamp_ms,
            category_id: category_id.into(),
            is_superfluous: None,
        }
    }

    pub fn expense(amount_cents: i64, timestamp_ms: i64, category_id: impl Into<String>) -> Self {
        Self {
            amount_cents,
            kind: TransactionType::Expense,
            timestamp_ms,
            category_id: category_id.into(),
            is_superfluous: None,
        }
    }

    /// Mark the transaction as superfluous regardless of its category
    pub fn superfluous(mut self) -> Self {
        self.is_superfluous = Some(true);
        self
    }

    /// Absolute amount in cents
    pub fn magnitude(&self) -> i64 {
        self.amount_cents.saturating_abs()
    }
}

/// A spending category with its nature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub spending_nature: SpendingNature,
}

impl Category {
    pub fn new(id: impl Into<String>, spending_nature: SpendingNature) -> Self {
        Self {
            id: id.into(),
            spending_nature,
        }
    }
}

/// A recorded evolve call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRun {
    pub id: i64,
    pub reason: EvolutionReason,
    pub trained: bool,
    pub epochs_run: u32,
    pub sample_count: usize,
    pub months_analyzed: usize,
    pub average_loss: Option<f64>,
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}
