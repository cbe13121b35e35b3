//! Receipt ledger and subscription settings.

use chrono::Duration;
use serde::Deserialize;

use crate::identifier::DEFAULT_MAX_ATTEMPTS;
use crate::model::BillingCycle;

/// Receipt issuance and listing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Candidate codes tried before issuance gives up.
    pub identifier_attempts: u32,
    /// Page size used when a listing request does not name one.
    pub default_page_size: u32,
    /// Upper clamp for listing page sizes.
    pub max_page_size: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            identifier_attempts: DEFAULT_MAX_ATTEMPTS,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Subscription lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Trial length granted to every new account.
    pub trial_days: u32,
    pub monthly_period_days: u32,
    pub yearly_period_days: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            trial_days: 14,
            monthly_period_days: 30,
            yearly_period_days: 365,
        }
    }
}

impl SubscriptionConfig {
    /// Length of one paid billing period.
    pub fn period(&self, cycle: BillingCycle) -> Duration {
        let days = match cycle {
            BillingCycle::Monthly => self.monthly_period_days,
            BillingCycle::Yearly => self.yearly_period_days,
        };
        Duration::days(i64::from(days))
    }
}
