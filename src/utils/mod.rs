//! Utility functions shared across services and storage.

pub mod bootstrap;
pub mod retry;
