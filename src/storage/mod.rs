//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{PointsStore, ReceiptStore, SubscriptionStore, UsageStore};

#[cfg(feature = "sqlite")]
pub mod helpers;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use crate::interfaces::Result;
pub use memory::{MemoryLedger, MemorySubscriptionStore, MemoryUsageStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteLedger, SqliteSubscriptionStore, SqliteUsageStore};

/// The four stores a running instance needs.
///
/// `receipts` and `points` are always backed by the same ledger so that a
/// claim and its credit share one unit of work.
#[derive(Clone)]
pub struct Stores {
    pub receipts: Arc<dyn ReceiptStore>,
    pub points: Arc<dyn PointsStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub usage: Arc<dyn UsageStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    pub fn memory() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        Self {
            receipts: ledger.clone(),
            points: ledger,
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
            usage: Arc::new(MemoryUsageStore::new()),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage = %config.storage_type, "Storage initialized");
            Ok(Stores::memory())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            if config.path != sqlite::MEMORY_PATH {
                if let Some(parent) = std::path::Path::new(&config.path).parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        crate::error::StorageError::Unsupported(format!(
                            "cannot create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let pool = sqlite::connect(&config.path, config.max_connections).await?;

            let ledger = Arc::new(SqliteLedger::new(pool.clone()));
            ledger.init().await?;
            let subscriptions = Arc::new(SqliteSubscriptionStore::new(pool.clone()));
            subscriptions.init().await?;
            let usage = Arc::new(SqliteUsageStore::new(pool));
            usage.init().await?;

            info!(storage = %config.storage_type, path = %config.path, "Storage initialized");
            Ok(Stores {
                receipts: ledger.clone(),
                points: ledger,
                subscriptions,
                usage,
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => Err(crate::error::StorageError::Unsupported(
            "SQLite storage requested but 'sqlite' feature is not enabled".to_string(),
        )),
    }
}
