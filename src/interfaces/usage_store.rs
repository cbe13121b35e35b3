//! Usage counter storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::entitlement::Limit;
use crate::model::{ActionType, Bucket, QuotaOutcome, UsageTracking, UserId};

/// Interface for usage counter persistence.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Counters for a user; `None` if nothing was ever recorded.
    async fn get(&self, user_id: UserId) -> Result<Option<UsageTracking>>;

    /// Atomically add one to the counter for `action`, creating the row on
    /// first use. Returns the counters after the change.
    async fn increment(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking>;

    /// Add one to the counter for `action` unless its reset-aware count has
    /// already reached `limit`. The check and the write are one atomic step,
    /// so concurrent callers never push a counter past its limit.
    async fn increment_within(
        &self,
        user_id: UserId,
        action: ActionType,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome>;

    /// Atomically subtract one, flooring at zero.
    async fn decrement(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking>;

    /// Zero every stale counter in `bucket` and stamp it with `now`.
    /// Returns the number of users with at least one counter reset.
    async fn reset_stale(&self, bucket: Bucket, now: DateTime<Utc>) -> Result<u64>;
}
