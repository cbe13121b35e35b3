//! Quota checks against the entitlement in force.
//!
//! Every read resolves the subscription and usage snapshot at the clock's
//! `now`, so answers are correct even between scheduler runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::entitlement::{self, Entitlement, Limit, UsageReport};
use crate::error::{Error, Result};
use crate::interfaces::{SubscriptionStore, UsageStore};
use crate::model::{ActionType, QuotaOutcome, UsageTracking, UserId};
use crate::utils::retry::retry_on_conflict;

pub struct EntitlementService {
    subscriptions: Arc<dyn SubscriptionStore>,
    usage: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl EntitlementService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        usage: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            usage,
            clock,
        }
    }

    async fn entitlement_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Entitlement> {
        let subscription = self
            .subscriptions
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("subscription for user {user_id}")))?;
        Ok(entitlement::resolve(&subscription, now))
    }

    async fn usage_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UsageTracking> {
        Ok(self
            .usage
            .get(user_id)
            .await?
            .unwrap_or_else(|| UsageTracking::new(user_id, now)))
    }

    /// Plan and limits in force now.
    pub async fn resolve(&self, user_id: UserId) -> Result<Entitlement> {
        self.entitlement_at(user_id, self.clock.now()).await
    }

    /// Whether the user may perform `action` once more.
    pub async fn check(&self, user_id: UserId, action: ActionType) -> Result<bool> {
        let now = self.clock.now();
        let entitlement = self.entitlement_at(user_id, now).await?;
        let usage = self.usage_at(user_id, now).await?;
        Ok(entitlement::can_perform(&usage, &entitlement.limits, action, now))
    }

    pub async fn report(&self, user_id: UserId, action: ActionType) -> Result<UsageReport> {
        let now = self.clock.now();
        let entitlement = self.entitlement_at(user_id, now).await?;
        let usage = self.usage_at(user_id, now).await?;
        let report = entitlement::remaining(&usage, &entitlement.limits, action, now);
        debug!(%user_id, %action, used = report.used, limit = %report.limit, "Usage report");
        Ok(report)
    }

    /// Count one use of `action` if the entitlement in force allows it.
    ///
    /// Fails with `QuotaExceeded` and records nothing when the limit is
    /// already reached. The limit check happens inside the store's write, so
    /// concurrent calls cannot overshoot it.
    pub async fn record(&self, user_id: UserId, action: ActionType) -> Result<UsageReport> {
        let now = self.clock.now();
        let entitlement = self.entitlement_at(user_id, now).await?;
        let limit = entitlement.limits.for_action(action);

        let outcome = retry_on_conflict("record_usage", || {
            self.usage.increment_within(user_id, action, limit, now)
        })
        .await?;
        let usage = match outcome {
            QuotaOutcome::Recorded(usage) => usage,
            QuotaOutcome::Exceeded { used } => {
                debug!(%user_id, %action, used, %limit, "Quota exceeded");
                return Err(Error::QuotaExceeded {
                    action,
                    used,
                    limit: match limit {
                        Limit::Limited(max) => max,
                        Limit::Unlimited => u32::MAX,
                    },
                });
            }
        };
        let report = entitlement::remaining(&usage, &entitlement.limits, action, now);
        info!(%user_id, %action, used = report.used, limit = %report.limit, "Usage recorded");
        Ok(report)
    }

    /// Give back one use of `action`, e.g. when a project is deleted.
    pub async fn release(&self, user_id: UserId, action: ActionType) -> Result<UsageReport> {
        let now = self.clock.now();
        let entitlement = self.entitlement_at(user_id, now).await?;
        let usage = retry_on_conflict("release_usage", || self.usage.decrement(user_id, action, now))
            .await?;
        let report = entitlement::remaining(&usage, &entitlement.limits, action, now);
        info!(%user_id, %action, used = report.used, "Usage released");
        Ok(report)
    }
}

#[cfg(test)]
mod tests;
