//! Per-user usage counters.
//!
//! Daily and monthly counters carry the instant they were last reset. A
//! counter whose reset is older than its bucket period reads as zero whether
//! or not the scheduler has rewritten it yet.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;
use crate::entitlement::Limit;

/// Quota-gated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    VoiceInput,
    Expense,
    Revenue,
    Supervisor,
    Project,
    Partner,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::VoiceInput,
        ActionType::Expense,
        ActionType::Revenue,
        ActionType::Supervisor,
        ActionType::Project,
        ActionType::Partner,
    ];

    pub fn bucket(&self) -> Bucket {
        match self {
            ActionType::VoiceInput | ActionType::Expense => Bucket::Daily,
            ActionType::Revenue => Bucket::Monthly,
            ActionType::Supervisor | ActionType::Project | ActionType::Partner => Bucket::Total,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::VoiceInput => "voice_input",
            ActionType::Expense => "expense",
            ActionType::Revenue => "revenue",
            ActionType::Supervisor => "supervisor",
            ActionType::Project => "project",
            ActionType::Partner => "partner",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action type: {s}"))
    }
}

/// Counter reset period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Daily,
    Monthly,
    /// Never auto-resets.
    Total,
}

impl Bucket {
    /// Counters reset at or before the returned instant are stale at `now`.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Bucket::Daily => Some(now - Duration::hours(24)),
            Bucket::Monthly => now.checked_sub_months(Months::new(1)),
            Bucket::Total => None,
        }
    }
}

/// A resettable counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub count: u32,
    pub last_reset: DateTime<Utc>,
}

impl Counter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            last_reset: now,
        }
    }

    pub fn is_stale(&self, bucket: Bucket, now: DateTime<Utc>) -> bool {
        bucket
            .stale_cutoff(now)
            .is_some_and(|cutoff| self.last_reset <= cutoff)
    }

    /// Value to trust at `now`.
    pub fn effective(&self, bucket: Bucket, now: DateTime<Utc>) -> u32 {
        if self.is_stale(bucket, now) {
            0
        } else {
            self.count
        }
    }

    /// Zero and restamp if stale. Returns whether a reset happened.
    pub fn reset_if_stale(&mut self, bucket: Bucket, now: DateTime<Utc>) -> bool {
        if !self.is_stale(bucket, now) {
            return false;
        }
        self.count = 0;
        self.last_reset = now;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub voice_inputs: Counter,
    pub expenses: Counter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub revenues: Counter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalUsage {
    pub supervisors: u32,
    pub projects: u32,
    pub partners: u32,
}

/// Result of a quota-guarded increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaOutcome {
    Recorded(UsageTracking),
    /// Nothing written; `used` is the reset-aware count at the limit.
    Exceeded { used: u32 },
}

/// All counters for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTracking {
    pub user_id: UserId,
    pub daily: DailyUsage,
    pub monthly: MonthlyUsage,
    pub total: TotalUsage,
}

impl UsageTracking {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            daily: DailyUsage {
                voice_inputs: Counter::new(now),
                expenses: Counter::new(now),
            },
            monthly: MonthlyUsage {
                revenues: Counter::new(now),
            },
            total: TotalUsage::default(),
        }
    }

    fn counter_mut(&mut self, action: ActionType) -> Option<&mut Counter> {
        match action {
            ActionType::VoiceInput => Some(&mut self.daily.voice_inputs),
            ActionType::Expense => Some(&mut self.daily.expenses),
            ActionType::Revenue => Some(&mut self.monthly.revenues),
            _ => None,
        }
    }

    fn total_mut(&mut self, action: ActionType) -> Option<&mut u32> {
        match action {
            ActionType::Supervisor => Some(&mut self.total.supervisors),
            ActionType::Project => Some(&mut self.total.projects),
            ActionType::Partner => Some(&mut self.total.partners),
            _ => None,
        }
    }

    /// Reset-aware count for `action` at `now`.
    pub fn used(&self, action: ActionType, now: DateTime<Utc>) -> u32 {
        let bucket = action.bucket();
        match action {
            ActionType::VoiceInput => self.daily.voice_inputs.effective(bucket, now),
            ActionType::Expense => self.daily.expenses.effective(bucket, now),
            ActionType::Revenue => self.monthly.revenues.effective(bucket, now),
            ActionType::Supervisor => self.total.supervisors,
            ActionType::Project => self.total.projects,
            ActionType::Partner => self.total.partners,
        }
    }

    /// Adjust exactly one counter by +1, resetting a stale counter first.
    pub fn increment(&mut self, action: ActionType, now: DateTime<Utc>) {
        let bucket = action.bucket();
        if let Some(counter) = self.counter_mut(action) {
            counter.reset_if_stale(bucket, now);
            counter.count = counter.count.saturating_add(1);
        } else if let Some(total) = self.total_mut(action) {
            *total = total.saturating_add(1);
        }
    }

    /// Count one use of `action` only if `limit` still permits it at `now`.
    /// Returns whether the counter moved.
    pub fn increment_within(&mut self, action: ActionType, limit: Limit, now: DateTime<Utc>) -> bool {
        if !limit.permits(self.used(action, now)) {
            return false;
        }
        self.increment(action, now);
        true
    }

    /// Adjust exactly one counter by -1, flooring at zero.
    pub fn decrement(&mut self, action: ActionType, now: DateTime<Utc>) {
        let bucket = action.bucket();
        if let Some(counter) = self.counter_mut(action) {
            counter.reset_if_stale(bucket, now);
            counter.count = counter.count.saturating_sub(1);
        } else if let Some(total) = self.total_mut(action) {
            *total = total.saturating_sub(1);
        }
    }

    /// Reset every stale counter in `bucket`. Returns whether any changed.
    pub fn reset_stale(&mut self, bucket: Bucket, now: DateTime<Utc>) -> bool {
        match bucket {
            Bucket::Daily => {
                let voice = self.daily.voice_inputs.reset_if_stale(bucket, now);
                let expenses = self.daily.expenses.reset_if_stale(bucket, now);
                voice || expenses
            }
            Bucket::Monthly => self.monthly.revenues.reset_if_stale(bucket, now),
            Bucket::Total => false,
        }
    }
}
