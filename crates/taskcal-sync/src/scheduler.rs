//! Polling scheduler for sync passes.
//!
//! The scheduler runs [`SyncManager::sync_all`] once at start and then on an
//! interval with random jitter. When every provider of a pass fails, the next
//! pass is delayed by an exponential backoff instead. A [`SchedulerHandle`]
//! controls the loop over an mpsc channel and exposes the latest summary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ManagerResult, SyncError};
use crate::manager::{SyncManager, SyncSummary};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Base interval between passes.
    pub interval: Duration,
    /// Maximum jitter as a fraction of the interval (0.0-1.0).
    pub jitter_fraction: f64,
    /// Delay after the first failed pass.
    pub initial_backoff: Duration,
    /// Upper bound for the backoff delay.
    pub max_backoff: Duration,
    /// Growth factor per consecutive failed pass.
    pub backoff_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(900),
            backoff_multiplier: 2.0,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Returns the interval with jitter applied.
    pub fn next_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let range = base * self.jitter_fraction;
        let jitter = if range > 0.0 {
            rand::rng().random_range(-range..=range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Returns the delay after `failures` consecutive failed passes.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a pass now, even while paused.
    SyncNow,
    /// Skip timed passes until resumed.
    Pause,
    /// Resume timed passes.
    Resume,
    /// Exit the loop.
    Stop,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Whether timed passes are skipped.
    pub paused: bool,
    /// Passes run so far.
    pub passes: u64,
    /// Consecutive passes in which every provider failed.
    pub consecutive_failures: u32,
    /// When the last pass finished.
    pub last_pass_at: Option<DateTime<Utc>>,
    /// When the last pass with at least one successful provider finished.
    pub last_success_at: Option<DateTime<Utc>>,
}

impl SchedulerState {
    fn record(&mut self, summary: &SyncSummary) {
        self.passes += 1;
        self.last_pass_at = Some(summary.finished_at);
        if summary.all_failed() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
            self.last_success_at = Some(summary.finished_at);
        }
    }
}

type SharedState = Arc<RwLock<SchedulerState>>;

/// Periodically runs a [`SyncManager`].
pub struct SyncScheduler {
    config: SchedulerConfig,
    manager: Arc<SyncManager>,
    state: SharedState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    summary_tx: watch::Sender<Option<SyncSummary>>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl SyncScheduler {
    /// Creates a scheduler for `manager`.
    pub fn new(config: SchedulerConfig, manager: Arc<SyncManager>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (summary_tx, _) = watch::channel(None);
        Self {
            config,
            manager,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            command_tx,
            command_rx,
            summary_tx,
        }
    }

    /// Returns a handle for controlling the scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
            summaries: self.summary_tx.subscribe(),
        }
    }

    /// Runs passes until stopped.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            providers = self.manager.providers().len(),
            "scheduler started"
        );

        self.pass().await;

        loop {
            let delay = self.next_delay().await;
            debug!(delay_secs = delay.as_secs(), "next sync pass scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if self.state.read().await.paused {
                        debug!("scheduler paused, skipping pass");
                        continue;
                    }
                    self.pass().await;
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::SyncNow) => {
                        debug!("sync requested");
                        self.pass().await;
                    }
                    Some(SchedulerCommand::Pause) => {
                        info!("scheduler paused");
                        self.state.write().await.paused = true;
                    }
                    Some(SchedulerCommand::Resume) => {
                        info!("scheduler resumed");
                        self.state.write().await.paused = false;
                    }
                    Some(SchedulerCommand::Stop) | None => {
                        info!("scheduler stopping");
                        break;
                    }
                },
            }
        }
    }

    async fn next_delay(&self) -> Duration {
        let failures = self.state.read().await.consecutive_failures;
        if failures > 0 {
            let backoff = self.config.backoff_delay(failures);
            debug!(failures, backoff_secs = backoff.as_secs(), "backing off");
            return backoff;
        }
        self.config.next_delay()
    }

    async fn pass(&self) {
        let summary = self.manager.sync_all().await;
        if summary.all_failed() {
            warn!(
                failures = summary.outcomes.len(),
                "every provider failed in this pass"
            );
        }
        self.state.write().await.record(&summary);
        self.summary_tx.send_replace(Some(summary));
    }
}

/// Controls a running [`SyncScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedState,
    summaries: watch::Receiver<Option<SyncSummary>>,
}

impl SchedulerHandle {
    async fn send(&self, command: SchedulerCommand) -> ManagerResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::SchedulerStopped)
    }

    /// Requests an immediate pass.
    pub async fn sync_now(&self) -> ManagerResult<()> {
        self.send(SchedulerCommand::SyncNow).await
    }

    /// Pauses timed passes.
    pub async fn pause(&self) -> ManagerResult<()> {
        self.send(SchedulerCommand::Pause).await
    }

    /// Resumes timed passes.
    pub async fn resume(&self) -> ManagerResult<()> {
        self.send(SchedulerCommand::Resume).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> ManagerResult<()> {
        self.send(SchedulerCommand::Stop).await
    }

    /// Returns a snapshot of the state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    /// Returns true if timed passes are paused.
    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }

    /// Returns a receiver notified after every pass.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncSummary>> {
        self.summaries.clone()
    }
}
