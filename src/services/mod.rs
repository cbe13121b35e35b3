//! Request-driven operations over the storage interfaces.

pub mod entitlements;
pub mod points;
pub mod receipts;
pub mod subscriptions;

pub use entitlements::EntitlementService;
pub use points::PointsService;
pub use receipts::ReceiptService;
pub use subscriptions::SubscriptionService;
