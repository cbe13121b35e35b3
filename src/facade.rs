//! Punchcard facade for in-process library usage.
//!
//! Wires storage, services and the scheduler from a single [`Config`].
//!
//! # Example
//!
//! ```ignore
//! use punchcard::{Config, Punchcard};
//! use punchcard::model::{EstablishmentId, IssueReceipt, UserId};
//!
//! let punchcard = Punchcard::builder(Config::load(None)?).build().await?;
//! let _scheduler = punchcard.start_scheduler();
//!
//! let issued = punchcard
//!     .receipts()
//!     .issue(establishment, IssueReceipt { amount: 100, ..Default::default() })
//!     .await?;
//! punchcard
//!     .receipts()
//!     .claim(establishment, issued.receipt_identifier.as_str(), user)
//!     .await?;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::StorageError;
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::services::{EntitlementService, PointsService, ReceiptService, SubscriptionService};
use crate::storage::{init_storage, Stores};

/// Builder for a [`Punchcard`] instance.
pub struct PunchcardBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    stores: Option<Stores>,
}

impl PunchcardBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            stores: None,
        }
    }

    /// Replace the wall clock, e.g. with a `ManualClock` in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use pre-built stores instead of opening the configured backend.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub async fn build(self) -> Result<Punchcard, StorageError> {
        let stores = match self.stores {
            Some(stores) => stores,
            None => init_storage(&self.config.storage).await?,
        };
        let clock = self.clock;
        let config = self.config;

        let scheduler = Arc::new(Scheduler::standard(
            &stores,
            clock.clone(),
            &config.scheduler,
        ));

        Ok(Punchcard {
            receipts: ReceiptService::new(
                stores.receipts.clone(),
                clock.clone(),
                config.ledger.clone(),
            ),
            points: PointsService::new(stores.points.clone(), clock.clone(), config.ledger.clone()),
            subscriptions: SubscriptionService::new(
                stores.subscriptions.clone(),
                clock.clone(),
                config.subscription.clone(),
            ),
            entitlements: EntitlementService::new(
                stores.subscriptions.clone(),
                stores.usage.clone(),
                clock,
            ),
            scheduler,
            stores,
            config,
        })
    }
}

/// Main punchcard instance: receipts, points, subscriptions and quotas.
pub struct Punchcard {
    config: Config,
    stores: Stores,
    receipts: ReceiptService,
    points: PointsService,
    subscriptions: SubscriptionService,
    entitlements: EntitlementService,
    scheduler: Arc<Scheduler>,
}

impl Punchcard {
    pub fn builder(config: Config) -> PunchcardBuilder {
        PunchcardBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn receipts(&self) -> &ReceiptService {
        &self.receipts
    }

    pub fn points(&self) -> &PointsService {
        &self.points
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn entitlements(&self) -> &EntitlementService {
        &self.entitlements
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Spawn the background scheduler if enabled in config.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_scheduler(&self) -> Option<SchedulerHandle> {
        if !self.config.scheduler.enabled {
            info!("Scheduler disabled");
            return None;
        }
        Some(
            self.scheduler
                .clone()
                .spawn(self.config.scheduler.tick_interval()),
        )
    }
}
