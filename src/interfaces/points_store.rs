//! Points ledger storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::model::{
    Balance, Credit, Debit, DebitOutcome, EstablishmentId, HistoryEntry, HistoryFilter, Page,
    PageRequest, UserId,
};

/// Interface for balance and history persistence.
///
/// Every mutation is a single atomic read-modify-write of one
/// (user, establishment) balance plus the matching history append.
#[async_trait]
pub trait PointsStore: Send + Sync {
    /// Add points, creating the balance on first earn.
    async fn credit(&self, credit: Credit, now: DateTime<Utc>) -> Result<Balance>;

    /// Remove points unless that would drive the balance negative.
    async fn debit(&self, debit: Debit, now: DateTime<Utc>) -> Result<DebitOutcome>;

    /// Current balance, if the user ever earned here.
    async fn balance(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Balance>>;

    /// Every balance a user holds, ordered by establishment.
    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>>;

    /// History for one establishment across users, newest first.
    async fn history(
        &self,
        establishment_id: EstablishmentId,
        filter: HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>>;

    /// Full history of one (user, establishment) pair, oldest first.
    async fn pair_history(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Vec<HistoryEntry>>;
}
