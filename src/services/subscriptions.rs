//! Subscription lifecycle operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::SubscriptionConfig;
use crate::error::{Error, Result, StorageError};
use crate::interfaces::SubscriptionStore;
use crate::model::{BillingCycle, Plan, Subscription, UserId};
use crate::utils::retry::{bounded_attempts, retry_on_conflict, Attempt};

/// Read-apply-write rounds before a lifecycle change gives up.
const MAX_MODIFY_ATTEMPTS: u32 = 5;

pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
    config: SubscriptionConfig,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            subscriptions,
            clock,
            config,
        }
    }

    /// Create the subscription for a new account, trial running.
    ///
    /// Idempotent: an existing subscription is returned unchanged.
    pub async fn start(&self, user_id: UserId) -> Result<Subscription> {
        let subscription = Subscription::new_account(user_id, self.clock.now(), self.config.trial_days);
        subscription.validate()?;

        let created =
            retry_on_conflict("create_subscription", || self.subscriptions.create(&subscription))
                .await?;
        if !created {
            debug!(%user_id, "Subscription already exists");
            return self.get(user_id).await;
        }

        info!(
            %user_id,
            trial_end = ?subscription.free_trial.end_date,
            "Subscription started"
        );
        Ok(subscription)
    }

    pub async fn get(&self, user_id: UserId) -> Result<Subscription> {
        self.subscriptions
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("subscription for user {user_id}")))
    }

    /// Move onto a paid plan for one billing period from now.
    pub async fn upgrade(
        &self,
        user_id: UserId,
        plan: Plan,
        cycle: BillingCycle,
        auto_renew: bool,
    ) -> Result<Subscription> {
        let period = self.config.period(cycle);
        let subscription = self
            .modify(user_id, |sub, now| sub.upgrade(plan, now, period, auto_renew))
            .await?;

        info!(%user_id, %plan, ?cycle, end = ?subscription.end_date, "Subscription upgraded");
        Ok(subscription)
    }

    /// Stop renewal. The plan stays in force until its end date.
    pub async fn cancel(&self, user_id: UserId) -> Result<Subscription> {
        let subscription = self.modify(user_id, |sub, _| sub.cancel()).await?;

        info!(%user_id, plan = %subscription.plan, "Subscription cancelled");
        Ok(subscription)
    }

    pub async fn downgrade_to_free(&self, user_id: UserId) -> Result<Subscription> {
        let subscription = self
            .modify(user_id, |sub, now| {
                sub.downgrade_to_free(now);
                Ok(())
            })
            .await?;

        info!(%user_id, "Subscription downgraded to free");
        Ok(subscription)
    }

    /// Read, apply `change`, and write back only if nobody changed the plan
    /// fields in between. A lost race re-reads and applies `change` again, so
    /// a scheduler rewrite is never overwritten with stale fields.
    ///
    /// Returns the stored subscription, including any trial expiry that
    /// landed while the change was in flight.
    async fn modify<F>(&self, user_id: UserId, change: F) -> Result<Subscription>
    where
        F: Fn(&mut Subscription, DateTime<Utc>) -> Result<()> + Sync,
    {
        let change = &change;
        let outcome = bounded_attempts(MAX_MODIFY_ATTEMPTS, |attempt| async move {
            let current = self.get(user_id).await?;
            let mut next = current.clone();
            change(&mut next, self.clock.now())?;
            next.validate()?;

            let written = retry_on_conflict("update_subscription", || {
                self.subscriptions.update(&current, &next)
            })
            .await?;
            if written {
                return Ok(Attempt::Done(()));
            }
            debug!(%user_id, attempt, "Subscription changed concurrently, reapplying");
            Ok::<_, Error>(Attempt::Retry)
        })
        .await?;

        if outcome.is_none() {
            return Err(Error::Storage(StorageError::Conflict(format!(
                "subscription for user {user_id} kept changing"
            ))));
        }
        self.get(user_id).await
    }
}
