//! Subscription snapshot and its explicit lifecycle transitions.
//!
//! There are no save hooks: a new account gets its trial from
//! [`Subscription::new_account`], stores persist only snapshots that pass
//! [`Subscription::validate`], and every derived value takes `now` explicitly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;
use crate::error::{Error, Result};

/// Subscription plan tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Tier1,
    Tier2,
    Tier3,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Tier1, Plan::Tier2, Plan::Tier3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Tier1 => "tier1",
            Plan::Tier2 => "tier2",
            Plan::Tier3 => "tier3",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown plan: {s}"))
    }
}

/// Lifecycle status of the stored plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Paid-plan billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

/// One-time trial window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTrial {
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub used: bool,
}

impl FreeTrial {
    /// Trial still grants unlimited entitlement at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.used && self.end_date.is_some_and(|end| now <= end)
    }
}

/// A user's subscription snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub free_trial: FreeTrial,
}

impl Subscription {
    /// Subscription for a newly created account: free plan with the trial running.
    pub fn new_account(user_id: UserId, now: DateTime<Utc>, trial_days: u32) -> Self {
        Self {
            user_id,
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: None,
            auto_renew: false,
            free_trial: FreeTrial {
                is_active: true,
                start_date: Some(now),
                end_date: Some(now + Duration::days(i64::from(trial_days))),
                used: false,
            },
        }
    }

    /// Whether the plan fields (everything but the trial) match `other`.
    pub fn same_terms(&self, other: &Subscription) -> bool {
        self.plan == other.plan
            && self.status == other.status
            && self.start_date == other.start_date
            && self.end_date == other.end_date
            && self.auto_renew == other.auto_renew
    }

    /// Copy the plan fields of `other`, keeping this trial record.
    pub fn adopt_terms(&mut self, other: &Subscription) {
        self.plan = other.plan;
        self.status = other.status;
        self.start_date = other.start_date;
        self.end_date = other.end_date;
        self.auto_renew = other.auto_renew;
    }

    /// Pre-persist invariant check.
    pub fn validate(&self) -> Result<()> {
        if self.plan == Plan::Free && self.end_date.is_some() {
            return Err(Error::validation("free plan cannot carry an end date"));
        }
        if self.free_trial.used && self.free_trial.is_active {
            return Err(Error::validation("a used free trial cannot be active"));
        }
        if let (Some(start), Some(end)) = (self.free_trial.start_date, self.free_trial.end_date) {
            if end < start {
                return Err(Error::validation("free trial ends before it starts"));
            }
        }
        if self.free_trial.is_active && self.free_trial.end_date.is_none() {
            return Err(Error::validation("active free trial needs an end date"));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::validation("subscription ends before it starts"));
            }
        }
        Ok(())
    }

    /// Move onto a paid plan for one billing period starting at `now`.
    ///
    /// A running trial is left alone; it lapses on its own schedule.
    pub fn upgrade(
        &mut self,
        plan: Plan,
        now: DateTime<Utc>,
        period: Duration,
        auto_renew: bool,
    ) -> Result<()> {
        if !plan.is_paid() {
            return Err(Error::validation("upgrade target must be a paid plan"));
        }
        self.plan = plan;
        self.status = SubscriptionStatus::Active;
        self.start_date = now;
        self.end_date = Some(now + period);
        self.auto_renew = auto_renew;
        Ok(())
    }

    /// Stop renewal; entitlements continue until the end date.
    pub fn cancel(&mut self) -> Result<()> {
        if !self.plan.is_paid() {
            return Err(Error::validation("only paid plans can be cancelled"));
        }
        self.status = SubscriptionStatus::Cancelled;
        self.auto_renew = false;
        Ok(())
    }

    /// Immediate move back to the free plan.
    pub fn downgrade_to_free(&mut self, now: DateTime<Utc>) {
        self.plan = Plan::Free;
        self.status = SubscriptionStatus::Active;
        self.start_date = now;
        self.end_date = None;
        self.auto_renew = false;
    }

    /// Paid plan whose end date has passed and that has not been rewritten yet.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.plan.is_paid()
            && self.status != SubscriptionStatus::Expired
            && self.end_date.is_some_and(|end| end < now)
    }

    /// Apply the expire-paid rewrite. Returns whether anything changed.
    pub fn expire_if_lapsed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_lapsed(now) {
            return false;
        }
        self.plan = Plan::Free;
        self.status = SubscriptionStatus::Expired;
        self.end_date = None;
        self.auto_renew = false;
        true
    }

    /// Trial flagged active whose window has closed.
    pub fn is_trial_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.free_trial.is_active && self.free_trial.end_date.is_some_and(|end| end < now)
    }

    /// Apply the expire-trial rewrite. The stored plan is never touched.
    pub fn expire_trial_if_lapsed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_trial_lapsed(now) {
            return false;
        }
        self.free_trial.is_active = false;
        self.free_trial.used = true;
        true
    }

    pub fn is_trial_active(&self, now: DateTime<Utc>) -> bool {
        self.free_trial.is_current(now)
    }

    /// Whole days left in the trial, rounded up; 0 once it is over.
    pub fn trial_days_remaining(&self, now: DateTime<Utc>) -> u32 {
        match self.free_trial.end_date {
            Some(end) if self.is_trial_active(now) => ceil_days(end - now),
            _ => 0,
        }
    }

    /// Paid entitlement no longer applies at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if !self.plan.is_paid() {
            return false;
        }
        match self.end_date {
            Some(end) => now > end,
            None => self.status != SubscriptionStatus::Active,
        }
    }

    /// Whole days until the paid plan ends, rounded up. `None` when the plan
    /// has no expiry.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<u32> {
        if !self.plan.is_paid() {
            return None;
        }
        self.end_date.map(|end| ceil_days(end - now))
    }
}

fn ceil_days(span: Duration) -> u32 {
    if span <= Duration::zero() {
        return 0;
    }
    const DAY_MS: i64 = 86_400_000;
    let days = (span.num_milliseconds() + DAY_MS - 1) / DAY_MS;
    u32::try_from(days).unwrap_or(u32::MAX)
}
