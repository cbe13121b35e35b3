//! In-memory UsageStore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::entitlement::Limit;
use crate::interfaces::{Result, UsageStore};
use crate::model::{ActionType, Bucket, QuotaOutcome, UsageTracking, UserId};

/// Usage counters keyed by user.
#[derive(Default)]
pub struct MemoryUsageStore {
    usage: Mutex<HashMap<UserId, UsageTracking>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UsageTracking>> {
        Ok(self.usage.lock().await.get(&user_id).cloned())
    }

    async fn increment(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking> {
        let mut store = self.usage.lock().await;
        let usage = store
            .entry(user_id)
            .or_insert_with(|| UsageTracking::new(user_id, now));
        usage.increment(action, now);
        Ok(usage.clone())
    }

    async fn increment_within(
        &self,
        user_id: UserId,
        action: ActionType,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome> {
        let mut store = self.usage.lock().await;
        let mut usage = store
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UsageTracking::new(user_id, now));
        if !usage.increment_within(action, limit, now) {
            return Ok(QuotaOutcome::Exceeded {
                used: usage.used(action, now),
            });
        }
        store.insert(user_id, usage.clone());
        Ok(QuotaOutcome::Recorded(usage))
    }

    async fn decrement(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking> {
        let mut store = self.usage.lock().await;
        let usage = store
            .entry(user_id)
            .or_insert_with(|| UsageTracking::new(user_id, now));
        usage.decrement(action, now);
        Ok(usage.clone())
    }

    async fn reset_stale(&self, bucket: Bucket, now: DateTime<Utc>) -> Result<u64> {
        let mut store = self.usage.lock().await;
        Ok(store
            .values_mut()
            .map(|usage| usage.reset_stale(bucket, now))
            .filter(|changed| *changed)
            .count() as u64)
    }
}
