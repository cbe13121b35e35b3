//! Maintenance jobs that persist what entitlement reads already assume.
//!
//! Each job is a set-based, idempotent rewrite keyed on `now`. Running one
//! twice, or late, changes nothing beyond the first run.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::interfaces::{SubscriptionStore, UsageStore};
use crate::model::Bucket;
use crate::utils::retry::retry_on_conflict;

/// A unit of scheduled work. Returns the number of records it changed.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Paid plans past their end date become free/expired.
pub struct ExpirePaidSubscriptions {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl ExpirePaidSubscriptions {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl Job for ExpirePaidSubscriptions {
    fn name(&self) -> &'static str {
        "expire_paid_subscriptions"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        retry_on_conflict(self.name(), || self.subscriptions.expire_paid(now)).await
    }
}

/// Trials past their end date are marked used. The stored plan is untouched.
pub struct ExpireFreeTrials {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl ExpireFreeTrials {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl Job for ExpireFreeTrials {
    fn name(&self) -> &'static str {
        "expire_free_trials"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        retry_on_conflict(self.name(), || self.subscriptions.expire_trials(now)).await
    }
}

pub struct ResetDailyCounters {
    usage: Arc<dyn UsageStore>,
}

impl ResetDailyCounters {
    pub fn new(usage: Arc<dyn UsageStore>) -> Self {
        Self { usage }
    }
}

#[async_trait]
impl Job for ResetDailyCounters {
    fn name(&self) -> &'static str {
        "reset_daily_counters"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        retry_on_conflict(self.name(), || self.usage.reset_stale(Bucket::Daily, now)).await
    }
}

pub struct ResetMonthlyCounters {
    usage: Arc<dyn UsageStore>,
}

impl ResetMonthlyCounters {
    pub fn new(usage: Arc<dyn UsageStore>) -> Self {
        Self { usage }
    }
}

#[async_trait]
impl Job for ResetMonthlyCounters {
    fn name(&self) -> &'static str {
        "reset_monthly_counters"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        retry_on_conflict(self.name(), || self.usage.reset_stale(Bucket::Monthly, now)).await
    }
}
