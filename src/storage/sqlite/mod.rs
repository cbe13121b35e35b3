//! SQLite implementations of storage interfaces.
//!
//! Every multi-statement mutation runs inside `BEGIN IMMEDIATE`, which takes
//! the database write lock up front. Writers are therefore serialized and a
//! read-modify-write inside one transaction cannot lose an update.

mod ledger;
mod subscription_store;
mod usage_store;

use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::interfaces::Result;

pub use ledger::SqliteLedger;
pub use subscription_store::SqliteSubscriptionStore;
pub use usage_store::SqliteUsageStore;

/// Path value selecting a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// How long a connection waits on the write lock before reporting a conflict.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection pool for `path`, creating the file if needed.
///
/// An in-memory database is private to its connection, so the pool is
/// limited to a single connection in that case.
pub async fn connect(path: &str, max_connections: u32) -> Result<SqlitePool> {
    if path == MEMORY_PATH {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        return Ok(pool);
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Write transaction opened with `BEGIN IMMEDIATE` on a pooled connection.
///
/// If the guard is dropped before [`WriteTx::finish`] completes (the caller's
/// future was cancelled mid-transaction), the connection is closed instead of
/// going back to the pool. Closing a SQLite connection rolls back whatever it
/// had open and releases the write lock.
struct WriteTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl WriteTx {
    /// Acquire a connection and take the write lock on it.
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut tx = Self {
            conn: pool.acquire().await?,
            open: true,
        };
        if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx.conn).await {
            tx.open = false;
            return Err(e.into());
        }
        Ok(tx)
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Commit on success, roll back on failure.
    async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        let (statement, outcome) = match result {
            Ok(value) => ("COMMIT", Ok(value)),
            Err(e) => ("ROLLBACK", Err(e)),
        };
        match sqlx::query(statement).execute(&mut *self.conn).await {
            Ok(_) => {
                self.open = false;
                outcome
            }
            Err(e) => {
                // Still inside the transaction; Drop discards the connection.
                warn!(statement, error = %e, "Transaction did not finish");
                outcome.and(Err(e.into()))
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}
