//! Background maintenance scheduler.
//!
//! Runs the expiry and counter-reset jobs on their cadences. Jobs share no
//! state with request handling beyond the stores, and entitlement reads are
//! already correct without them, so a late or skipped run only delays the
//! persisted rewrite.

mod cadence;
mod jobs;

pub use cadence::Cadence;
pub use jobs::{
    ExpireFreeTrials, ExpirePaidSubscriptions, Job, ResetDailyCounters, ResetMonthlyCounters,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::StorageError;
use crate::storage::Stores;

/// Result of one job run.
#[derive(Debug)]
pub struct JobReport {
    pub job: &'static str,
    /// Records changed, or the error that stopped the job.
    pub outcome: Result<u64, StorageError>,
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    cadence: Cadence,
    /// `None` until the first tick, which runs the job immediately.
    next_run: Option<DateTime<Utc>>,
}

pub struct Scheduler {
    jobs: Mutex<Vec<ScheduledJob>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            clock,
        }
    }

    pub fn with_job(mut self, job: Arc<dyn Job>, cadence: Cadence) -> Self {
        self.jobs.get_mut().push(ScheduledJob {
            job,
            cadence,
            next_run: None,
        });
        self
    }

    /// The four maintenance jobs wired to `stores`.
    ///
    /// Expiry jobs run every `expiry_interval`; counter resets run at the
    /// UTC day and month boundaries.
    pub fn standard(stores: &Stores, clock: Arc<dyn Clock>, config: &SchedulerConfig) -> Self {
        let expiry = Cadence::Every(
            chrono::Duration::from_std(config.expiry_interval())
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        );
        Self::new(clock)
            .with_job(
                Arc::new(ExpirePaidSubscriptions::new(stores.subscriptions.clone())),
                expiry,
            )
            .with_job(
                Arc::new(ExpireFreeTrials::new(stores.subscriptions.clone())),
                expiry,
            )
            .with_job(
                Arc::new(ResetDailyCounters::new(stores.usage.clone())),
                Cadence::DayBoundary,
            )
            .with_job(
                Arc::new(ResetMonthlyCounters::new(stores.usage.clone())),
                Cadence::MonthBoundary,
            )
    }

    /// Run every job due at `now`, then schedule its next run.
    ///
    /// A failing job is reported and rescheduled; it does not stop the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JobReport> {
        let mut jobs = self.jobs.lock().await;
        let mut reports = Vec::new();
        for scheduled in jobs.iter_mut() {
            if scheduled.next_run.is_some_and(|next| now < next) {
                continue;
            }
            reports.push(run_job(scheduled.job.as_ref(), now).await);
            scheduled.next_run = Some(scheduled.cadence.next_after(now));
        }
        reports
    }

    /// Run every job now regardless of schedule.
    pub async fn run_all(&self, now: DateTime<Utc>) -> Vec<JobReport> {
        let jobs = self.jobs.lock().await;
        let mut reports = Vec::with_capacity(jobs.len());
        for scheduled in jobs.iter() {
            reports.push(run_job(scheduled.job.as_ref(), now).await);
        }
        reports
    }

    /// Drive [`Scheduler::tick`] from a background task.
    ///
    /// Returns a handle that can be used to stop the task.
    pub fn spawn(self: Arc<Self>, tick_interval: Duration) -> SchedulerHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(
                tick_interval_ms = tick_interval.as_millis() as u64,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick(self.clock.now()).await;
                    }
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            info!("Scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });

        SchedulerHandle {
            cancel: cancel_tx,
            task,
        }
    }
}

async fn run_job(job: &dyn Job, now: DateTime<Utc>) -> JobReport {
    let started = Instant::now();
    let outcome = job.run(now).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &outcome {
        Ok(affected) => info!(job = job.name(), affected, elapsed_ms, "Job finished"),
        Err(e) => warn!(job = job.name(), error = %e, elapsed_ms, "Job failed"),
    }

    JobReport {
        job: job.name(),
        outcome,
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop after any job in progress.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}
