//! Shared storage integration tests.
//!
//! Tests the ledger, subscription and usage store interfaces against all
//! implementations. Each implementation module imports these test functions
//! and runs them.

pub mod ledger_tests;
pub mod subscription_store_tests;
pub mod usage_store_tests;
