//! Storage configuration types.

use serde::Deserialize;

/// Default SQLite database file.
pub const DEFAULT_SQLITE_PATH: &str = "data/punchcard.db";

/// Default pool size for file-backed SQLite.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Sqlite,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => f.write_str("memory"),
            StorageType::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite database path, or `:memory:` for a private in-memory database.
    pub path: String,
    /// Maximum pooled SQLite connections.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            path: DEFAULT_SQLITE_PATH.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            path: path.into(),
            ..Self::default()
        }
    }
}
