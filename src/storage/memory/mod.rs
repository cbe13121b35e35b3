//! In-process storage implementations.
//!
//! Suitable for tests and single-process deployments. State is lost when the
//! process exits.

mod ledger;
mod subscription_store;
mod usage_store;

pub use ledger::MemoryLedger;
pub use subscription_store::MemorySubscriptionStore;
pub use usage_store::MemoryUsageStore;
