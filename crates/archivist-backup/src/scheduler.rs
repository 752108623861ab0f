//! Periodic backups.
//!
//! The first cycle runs as soon as the scheduler starts, then one per
//! interval. A cycle that is still running when the next tick arrives
//! causes that tick to be skipped. A failed cycle is logged and the
//! schedule carries on.

use crate::artifact::{Artifact, BackupOptions};
use crate::engine::BackupEngine;
use crate::error::BackupError;
use archivist_core::ArtifactKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What one scheduled cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(Artifact),
    /// Another cycle was still in flight
    Skipped,
    Failed(BackupError),
}

/// Drives unattended `auto` backups through a [`BackupEngine`].
#[derive(Debug, Clone)]
pub struct Scheduler {
    engine: Arc<BackupEngine>,
    interval: Duration,
    options: BackupOptions,
    in_progress: Arc<AtomicBool>,
}

impl Scheduler {
    /// Scheduler using the engine's `schedule` configuration.
    pub fn new(engine: Arc<BackupEngine>) -> Self {
        let schedule = engine.config().schedule.clone();
        let interval = Duration::from_secs(schedule.interval_hours.saturating_mul(3600));
        let options = BackupOptions::default()
            .with_compression(schedule.compressed)
            .with_auto_cleanup(schedule.auto_cleanup);

        Self {
            engine,
            interval: interval.max(MIN_INTERVAL),
            options,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Overrides the options used for each cycle.
    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run one cycle now, unless one is already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous backup cycle still running, skipping this one");
            return CycleOutcome::Skipped;
        }
        let _flight = FlightGuard(self.in_progress.clone());

        info!("Starting scheduled backup");
        match self
            .engine
            .create_backup(ArtifactKind::Auto, self.options.clone())
            .await
        {
            Ok(artifact) => {
                info!("Scheduled backup completed: {}", artifact.filename);
                CycleOutcome::Completed(artifact)
            }
            Err(e) => {
                error!("Scheduled backup failed: {}", e);
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Start the timer. Each tick runs its cycle on its own task, so a
    /// panicking cycle cannot take the timer down with it.
    pub fn start(self) -> SchedulerHandle {
        let in_progress = self.in_progress.clone();
        info!("Scheduler started, interval {:?}", self.interval);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let scheduler = self.clone();
                tokio::spawn(async move {
                    scheduler.run_cycle().await;
                });
            }
        });

        SchedulerHandle { task, in_progress }
    }
}

/// Clears the in-progress flag when a cycle ends, including by panic.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running scheduler. Dropping it stops the timer.
///
/// Stopping does not cancel a cycle that is already running.
#[derive(Debug)]
pub struct SchedulerHandle {
    task: JoinHandle<()>,
    in_progress: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn stop(self) {
        self.task.abort();
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
