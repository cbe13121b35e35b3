//! Receipt storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::identifier::ReceiptCode;
use crate::model::{ClaimOutcome, EstablishmentId, Page, PageRequest, Receipt, ReceiptFilter, UserId};

/// Interface for receipt persistence.
///
/// Implementations:
/// - `MemoryLedger`: in-process storage
/// - `SqliteLedger`: SQLite storage
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Persist a freshly issued receipt.
    ///
    /// Fails with `StorageError::DuplicateIdentifier` if the code is taken.
    async fn insert(&self, receipt: &Receipt) -> Result<()>;

    /// Whether any establishment holds a receipt with this code.
    async fn code_exists(&self, code: &ReceiptCode) -> Result<bool>;

    /// Look up a receipt scoped to its establishment.
    async fn find(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Receipt>>;

    /// Claim a receipt and credit its amount to the claimant in one unit of work.
    ///
    /// Linearizable per code: of any number of concurrent calls at most one
    /// returns `ClaimOutcome::Claimed`. Either the claim and its `earned`
    /// history entry are both stored, or neither is.
    async fn claim(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// An establishment's receipts, newest first.
    async fn list(
        &self,
        establishment_id: EstablishmentId,
        filter: ReceiptFilter,
        page: PageRequest,
    ) -> Result<Page<Receipt>>;
}
