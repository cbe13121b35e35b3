//! Abstract storage interfaces.
//!
//! These traits define the persistence contracts for:
//! - Receipts and the claim transition (atomic with the ledger credit)
//! - Point balances and their history
//! - Subscriptions
//! - Usage counters

pub mod points_store;
pub mod receipt_store;
pub mod subscription_store;
pub mod usage_store;

pub use points_store::PointsStore;
pub use receipt_store::ReceiptStore;
pub use subscription_store::SubscriptionStore;
pub use usage_store::UsageStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, crate::error::StorageError>;
