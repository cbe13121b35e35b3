//! Receipts and the claim transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EstablishmentId, ReceiptId, UserId};
use super::points::Balance;
use crate::identifier::ReceiptCode;

/// Opaque key/value data attached by the issuing establishment.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// An establishment-issued point award redeemable exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub code: ReceiptCode,
    pub establishment_id: EstablishmentId,
    pub amount: u64,
    pub claimed: bool,
    pub claimed_by: Option<UserId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub customer_phone: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Receipt {
    /// A fresh, unclaimed receipt.
    pub fn new(
        code: ReceiptCode,
        establishment_id: EstablishmentId,
        amount: u64,
        customer_phone: Option<String>,
        metadata: Metadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReceiptId::new(),
            code,
            establishment_id,
            amount,
            claimed: false,
            claimed_by: None,
            claimed_at: None,
            customer_phone,
            metadata,
            created_at: now,
        }
    }

    /// Transition `unclaimed -> claimed`. Returns false, leaving the receipt
    /// untouched, if it was already claimed.
    pub fn mark_claimed(&mut self, user: UserId, now: DateTime<Utc>) -> bool {
        if self.claimed {
            return false;
        }
        self.claimed = true;
        self.claimed_by = Some(user);
        self.claimed_at = Some(now);
        true
    }

    pub fn matches(&self, filter: &ReceiptFilter) -> bool {
        filter.claimed.map_or(true, |claimed| self.claimed == claimed)
    }
}

/// List filter for an establishment's receipts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptFilter {
    pub claimed: Option<bool>,
}

/// Input to receipt issuance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueReceipt {
    pub amount: u64,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Output of receipt issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedReceipt {
    pub id: ReceiptId,
    pub receipt_identifier: ReceiptCode,
    pub amount: u64,
    pub claimed: bool,
}

impl From<&Receipt> for IssuedReceipt {
    fn from(receipt: &Receipt) -> Self {
        Self {
            id: receipt.id,
            receipt_identifier: receipt.code.clone(),
            amount: receipt.amount,
            claimed: receipt.claimed,
        }
    }
}

/// Output of a successful claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    pub points_added: u64,
    pub total_points: u64,
    pub receipt: Receipt,
}

/// What a store observed when asked to claim a receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// Receipt transitioned and the balance was credited in the same unit of work.
    Claimed { receipt: Receipt, balance: Balance },
    NotFound,
    AlreadyClaimed(Receipt),
}
