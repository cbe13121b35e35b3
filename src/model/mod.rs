//! Domain types persisted by the stores.

mod ids;
mod page;
mod points;
mod receipt;
mod subscription;
mod usage;

pub use ids::{EstablishmentId, ReceiptId, UserId};
pub use page::{Page, PageRequest};
pub use points::{
    Balance, Credit, DeductPoints, DeductResult, Debit, DebitOutcome, HistoryEntry,
    HistoryFilter, HistoryKind, Reconciliation, MAX_POINTS,
};
pub use receipt::{
    ClaimOutcome, ClaimResult, IssueReceipt, IssuedReceipt, Metadata, Receipt, ReceiptFilter,
};
pub use subscription::{BillingCycle, FreeTrial, Plan, Subscription, SubscriptionStatus};
pub use usage::{
    ActionType, Bucket, Counter, DailyUsage, MonthlyUsage, QuotaOutcome, TotalUsage, UsageTracking,
};
