//! Scheduler background daemon.
//!
//! Calls [`SchedulerService::tick`] on a fixed interval until stopped:
//! - activating and completing activities on time
//! - executing due schedules and inserting the next occurrences
//! - recovering schedules interrupted mid-execution

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::{SchedulerConfig, TickReport};
use crate::services::scheduler_service::SchedulerService;

/// Configuration for the scheduler daemon.
#[derive(Debug, Clone)]
pub struct SchedulerDaemonConfig {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Whether to tick immediately on startup.
    pub run_on_startup: bool,
    /// Maximum consecutive failed ticks before stopping.
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerDaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            run_on_startup: true,
            max_consecutive_failures: 5,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerDaemonConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            ..Default::default()
        }
    }
}

/// Event emitted by the scheduler daemon.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Started,
    TickCompleted {
        tick_number: u64,
        report: TickReport,
        duration_ms: u64,
    },
    TickFailed {
        tick_number: u64,
        error: String,
    },
    Stopped {
        reason: StopReason,
    },
}

/// Reason the daemon stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TooManyFailures,
}

/// Counters kept while the daemon runs.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_ticks: u64,
    pub successful_ticks: u64,
    pub failed_ticks: u64,
    pub last_tick: Option<Instant>,
    pub schedules_executed: u64,
    pub participations: u64,
}

/// Handle to control a running daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    /// Request the daemon to stop; it exits without waiting for the next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }
}

pub struct SchedulerDaemon {
    scheduler: Arc<SchedulerService>,
    config: SchedulerDaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SchedulerDaemon {
    pub fn new(scheduler: Arc<SchedulerService>, config: SchedulerDaemonConfig) -> Self {
        Self {
            scheduler,
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.config.tick_interval = tick_interval;
        self
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
            status: self.status.clone(),
        }
    }

    /// Spawn the daemon, returning a channel for its events.
    pub fn run(self) -> mpsc::Receiver<SchedulerEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    /// Run the daemon on the current task until it stops.
    pub async fn run_with_sender(self, tx: mpsc::Sender<SchedulerEvent>) {
        self.run_loop(tx).await;
    }

    async fn run_loop(self, tx: mpsc::Sender<SchedulerEvent>) {
        self.status.write().await.running = true;
        let _ = tx.send(SchedulerEvent::Started).await;
        info!(interval_secs = self.config.tick_interval.as_secs(), "scheduler daemon started");

        let mut consecutive_failures = 0u32;
        let mut timer = interval(self.config.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.config.run_on_startup {
            timer.tick().await;
        }

        let reason = loop {
            tokio::select! {
                _ = timer.tick() => {
                    if self.stop_flag.load(Ordering::Acquire) {
                        break StopReason::Requested;
                    }
                    self.run_tick(&tx, &mut consecutive_failures).await;
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        error!(consecutive_failures, "scheduler daemon giving up");
                        break StopReason::TooManyFailures;
                    }
                }
                _ = self.wake.notified() => {}
            }

            if self.stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }
        };

        self.status.write().await.running = false;
        info!(?reason, "scheduler daemon stopped");
        let _ = tx.send(SchedulerEvent::Stopped { reason }).await;
    }

    async fn run_tick(&self, tx: &mpsc::Sender<SchedulerEvent>, consecutive_failures: &mut u32) {
        let tick_number = {
            let mut status = self.status.write().await;
            status.total_ticks += 1;
            status.total_ticks
        };

        let start = Instant::now();
        let result = self.scheduler.tick(Utc::now()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                *consecutive_failures = 0;
                {
                    let mut status = self.status.write().await;
                    status.successful_ticks += 1;
                    status.last_tick = Some(Instant::now());
                    status.schedules_executed += report.executed as u64;
                    status.participations += report.participations as u64;
                }
                let _ = tx
                    .send(SchedulerEvent::TickCompleted {
                        tick_number,
                        report,
                        duration_ms,
                    })
                    .await;
            }
            Err(e) => {
                *consecutive_failures += 1;
                error!(tick_number, error = %e, "scheduler tick failed");
                self.status.write().await.failed_ticks += 1;
                let _ = tx
                    .send(SchedulerEvent::TickFailed {
                        tick_number,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Tick once outside the loop.
    pub async fn run_once(&self) -> DomainResult<TickReport> {
        self.scheduler.tick(Utc::now()).await
    }

    pub fn config(&self) -> &SchedulerDaemonConfig {
        &self.config
    }
}
