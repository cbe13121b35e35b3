//! Punchcard - loyalty points and subscription entitlements
//!
//! Establishments issue single-use receipts; users claim them into
//! per-establishment point balances backed by an append-only history.
//! Alongside the ledger, subscriptions resolve to quota limits that gate
//! usage, with a background scheduler persisting expiries and counter
//! resets.

pub mod clock;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod facade;
pub mod identifier;
pub mod interfaces;
pub mod model;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result, StorageError};
pub use facade::{Punchcard, PunchcardBuilder};
