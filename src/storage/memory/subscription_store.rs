//! In-memory SubscriptionStore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::interfaces::{Result, SubscriptionStore};
use crate::model::{Subscription, UserId};

/// Subscriptions keyed by user.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: RwLock<HashMap<UserId, Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<bool> {
        let mut store = self.subscriptions.write().await;
        if store.contains_key(&subscription.user_id) {
            return Ok(false);
        }
        store.insert(subscription.user_id, subscription.clone());
        Ok(true)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&user_id).cloned())
    }

    async fn update(&self, current: &Subscription, next: &Subscription) -> Result<bool> {
        let mut store = self.subscriptions.write().await;
        match store.get_mut(&next.user_id) {
            Some(existing) if existing.same_terms(current) => {
                existing.adopt_terms(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_paid(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut store = self.subscriptions.write().await;
        Ok(store
            .values_mut()
            .map(|sub| sub.expire_if_lapsed(now))
            .filter(|changed| *changed)
            .count() as u64)
    }

    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut store = self.subscriptions.write().await;
        Ok(store
            .values_mut()
            .map(|sub| sub.expire_trial_if_lapsed(now))
            .filter(|changed| *changed)
            .count() as u64)
    }
}
