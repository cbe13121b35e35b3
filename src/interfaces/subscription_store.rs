//! Subscription storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::model::{Subscription, UserId};

/// Interface for subscription persistence.
///
/// Callers hand over snapshots that already passed `Subscription::validate`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert if absent. Returns false (and stores nothing) when the user
    /// already has a subscription.
    async fn create(&self, subscription: &Subscription) -> Result<bool>;

    async fn get(&self, user_id: UserId) -> Result<Option<Subscription>>;

    /// Write the plan fields of `next`, provided the stored plan fields still
    /// equal those of `current` (the snapshot `next` was derived from).
    ///
    /// Trial fields are never written here; they belong to `create` and
    /// `expire_trials`. Returns false when no row matched, either because
    /// there is no subscription or because it changed since `current` was read.
    async fn update(&self, current: &Subscription, next: &Subscription) -> Result<bool>;

    /// Rewrite every lapsed paid subscription to the free plan.
    /// Returns the number of subscriptions changed.
    async fn expire_paid(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Close every lapsed trial, marking it used.
    /// Returns the number of subscriptions changed.
    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<u64>;
}
