//! Background scheduler settings.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Spawn the background loop when the facade starts.
    pub enabled: bool,
    /// How often the loop wakes to look for due jobs.
    pub tick_interval_secs: u64,
    /// Cadence of the subscription and trial expiry jobs.
    pub expiry_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 60,
            expiry_interval_secs: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs.max(1))
    }
}
