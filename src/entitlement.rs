//! Entitlement resolution and quota checks.
//!
//! Everything here is a pure function of a snapshot and an explicit `now`.
//! Resolution runs ahead of the scheduler: a lapsed trial or an expired paid
//! plan yields the correct limits even if the stored row still says otherwise.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ActionType, Plan, Subscription, SubscriptionStatus, UsageTracking};

/// A numeric ceiling, or none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limit {
    Limited(u32),
    Unlimited,
}

impl Limit {
    /// Whether one more use is allowed after `used`.
    pub fn permits(&self, used: u32) -> bool {
        match self {
            Limit::Limited(max) => used < *max,
            Limit::Unlimited => true,
        }
    }

    pub fn remaining(&self, used: u32) -> Limit {
        match self {
            Limit::Limited(max) => Limit::Limited(max.saturating_sub(used)),
            Limit::Unlimited => Limit::Unlimited,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Limited(n) => write!(f, "{n}"),
            Limit::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Limits across every quota dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub voice_inputs_per_day: Limit,
    pub expenses_per_day: Limit,
    pub revenues_per_month: Limit,
    pub supervisors: Limit,
    pub projects: Limit,
    pub partners: Limit,
}

impl Limits {
    pub const UNLIMITED: Limits = Limits {
        voice_inputs_per_day: Limit::Unlimited,
        expenses_per_day: Limit::Unlimited,
        revenues_per_month: Limit::Unlimited,
        supervisors: Limit::Unlimited,
        projects: Limit::Unlimited,
        partners: Limit::Unlimited,
    };

    /// Fixed table for a stored plan.
    pub fn for_plan(plan: Plan) -> Limits {
        use Limit::{Limited, Unlimited};
        match plan {
            Plan::Free => Limits {
                voice_inputs_per_day: Limited(3),
                expenses_per_day: Limited(5),
                revenues_per_month: Limited(3),
                supervisors: Limited(0),
                projects: Limited(0),
                partners: Limited(0),
            },
            Plan::Tier1 => Limits {
                voice_inputs_per_day: Limited(10),
                expenses_per_day: Limited(20),
                revenues_per_month: Limited(20),
                supervisors: Limited(1),
                projects: Limited(3),
                partners: Limited(2),
            },
            Plan::Tier2 => Limits {
                voice_inputs_per_day: Limited(30),
                expenses_per_day: Unlimited,
                revenues_per_month: Unlimited,
                supervisors: Limited(3),
                projects: Limited(10),
                partners: Limited(5),
            },
            Plan::Tier3 => Limits::UNLIMITED,
        }
    }

    pub fn for_action(&self, action: ActionType) -> Limit {
        match action {
            ActionType::VoiceInput => self.voice_inputs_per_day,
            ActionType::Expense => self.expenses_per_day,
            ActionType::Revenue => self.revenues_per_month,
            ActionType::Supervisor => self.supervisors,
            ActionType::Project => self.projects,
            ActionType::Partner => self.partners,
        }
    }
}

/// The plan whose limits apply right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "plan")]
pub enum EffectivePlan {
    /// Trial override, independent of the stored plan.
    FreeTrial,
    Plan(Plan),
}

/// Resolved plan and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub effective_plan: EffectivePlan,
    pub limits: Limits,
}

/// Map a subscription snapshot to the entitlement in force at `now`.
pub fn resolve(subscription: &Subscription, now: DateTime<Utc>) -> Entitlement {
    if subscription.free_trial.is_current(now) {
        return Entitlement {
            effective_plan: EffectivePlan::FreeTrial,
            limits: Limits::UNLIMITED,
        };
    }

    let plan = match subscription.plan {
        Plan::Free => Plan::Free,
        paid => match subscription.end_date {
            Some(end) if now > end => Plan::Free,
            Some(_) => match subscription.status {
                SubscriptionStatus::Active | SubscriptionStatus::Cancelled => paid,
                SubscriptionStatus::Inactive | SubscriptionStatus::Expired => Plan::Free,
            },
            // Legacy rows without an end date only count while active
            None if subscription.status == SubscriptionStatus::Active => paid,
            None => Plan::Free,
        },
    };

    Entitlement {
        effective_plan: EffectivePlan::Plan(plan),
        limits: Limits::for_plan(plan),
    }
}

/// Usage figures for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub used: u32,
    pub limit: Limit,
    pub remaining: Limit,
}

/// Whether `action` may be performed once more at `now`.
pub fn can_perform(
    usage: &UsageTracking,
    limits: &Limits,
    action: ActionType,
    now: DateTime<Utc>,
) -> bool {
    limits.for_action(action).permits(usage.used(action, now))
}

/// Used/limit/remaining for `action` at `now`.
pub fn remaining(
    usage: &UsageTracking,
    limits: &Limits,
    action: ActionType,
    now: DateTime<Utc>,
) -> UsageReport {
    let used = usage.used(action, now);
    let limit = limits.for_action(action);
    UsageReport {
        used,
        limit,
        remaining: limit.remaining(used),
    }
}
