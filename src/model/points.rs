//! Point balances and their append-only history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EstablishmentId, ReceiptId, UserId};

/// Largest amount a receipt, deduction or balance may carry. Both storage
/// backends share this ceiling (SQLite stores points as signed 64-bit).
pub const MAX_POINTS: u64 = i64::MAX as u64;

/// Kind of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Earned,
    Deducted,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryKind::Earned => "earned",
            HistoryKind::Deducted => "deducted",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(HistoryKind::Earned),
            "deducted" => Ok(HistoryKind::Deducted),
            other => Err(format!("unknown history kind: {other}")),
        }
    }
}

/// A user's point total at one establishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    pub amount: u64,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit record of one earn or deduct event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub amount: u64,
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    /// Set only for entries earned via a receipt claim.
    pub receipt_id: Option<ReceiptId>,
    pub description: String,
    pub balance_after: u64,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn signed_amount(&self) -> i128 {
        match self.kind {
            HistoryKind::Earned => i128::from(self.amount),
            HistoryKind::Deducted => -i128::from(self.amount),
        }
    }

    pub fn matches(&self, filter: &HistoryFilter) -> bool {
        filter.user_id.map_or(true, |u| u == self.user_id)
            && filter.kind.map_or(true, |k| k == self.kind)
    }
}

/// Filter for establishment-scoped history queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub user_id: Option<UserId>,
    pub kind: Option<HistoryKind>,
}

/// A credit request as handed to a points store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    pub amount: u64,
    pub receipt_id: Option<ReceiptId>,
    pub description: String,
}

/// A debit request as handed to a points store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debit {
    pub user_id: UserId,
    pub establishment_id: EstablishmentId,
    pub amount: u64,
    pub description: String,
}

/// What a store observed when asked to debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited(Balance),
    /// Balance left unchanged.
    Insufficient { available: u64 },
}

/// Input to an establishment-initiated deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductPoints {
    pub user_id: UserId,
    pub points: u64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Output of a successful deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductResult {
    pub points_deducted: u64,
    pub remaining_points: u64,
}

/// Comparison of a stored balance against the fold of its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub balance: u64,
    pub history_sum: i128,
    pub entries: usize,
}

impl Reconciliation {
    pub fn from_history(balance: u64, entries: &[HistoryEntry]) -> Self {
        Self {
            balance,
            history_sum: entries.iter().map(HistoryEntry::signed_amount).sum(),
            entries: entries.len(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.history_sum == i128::from(self.balance)
    }
}
