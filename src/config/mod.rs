//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod ledger;
mod scheduler;
mod storage;

pub use ledger::{LedgerConfig, SubscriptionConfig};
pub use scheduler::SchedulerConfig;
pub use storage::{StorageConfig, StorageType, DEFAULT_MAX_CONNECTIONS, DEFAULT_SQLITE_PATH};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "punchcard.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PUNCHCARD_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PUNCHCARD";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PUNCHCARD_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Receipt issuance and listing.
    pub ledger: LedgerConfig,
    /// Trial length and billing periods.
    pub subscription: SubscriptionConfig,
    /// Background maintenance jobs.
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `punchcard.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `PUNCHCARD__STORAGE__TYPE=sqlite`
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// In-memory storage, scheduler off. Tests drive jobs by hand.
    pub fn for_test() -> Self {
        Self {
            scheduler: SchedulerConfig {
                enabled: false,
                ..SchedulerConfig::default()
            },
            ..Self::default()
        }
    }
}
