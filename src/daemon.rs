//! Daemon Infrastructure - startup checks and the periodic check loop
//!
//! Startup failures (calendar API unreachable, catalog login rejected, a
//! forced state reset that cannot be written) are fatal. Once the loop runs,
//! cycle failures are logged and the next cycle is attempted on schedule.
//!
//! Shutdown is cooperative: the loop waits for the next cycle in short
//! slices and exits when the [`CancellationToken`] fires. A cycle that is
//! already running always completes first.

use crate::catalog::StremioClient;
use crate::checker::ReleaseChecker;
use crate::cycle::{CycleRunner, CycleSettings, CycleSummary};
use crate::metadata::CinemetaClient;
use crate::notifier::{HomeAssistantCalendar, Notifier};
use crate::store::ReleaseStore;
use crate::Config;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Granularity of the wait between cycles
pub const WAIT_SLICE: Duration = Duration::from_secs(30);

/// How a wait between cycles ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Cycle statistics since startup
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub total_cycles: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub notified_total: u64,
    pub last_cycle: Option<Instant>,
}

/// Periodic release checker
pub struct Daemon {
    runner: CycleRunner,
    interval: Duration,
    status: DaemonStatus,
}

impl Daemon {
    pub fn new(runner: CycleRunner, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            status: DaemonStatus::default(),
        }
    }

    /// Perform the startup checks and build a ready-to-run daemon
    pub async fn start(config: &Config) -> Result<Self> {
        let runner = connect(config).await?;
        Ok(Self::new(runner, config.check_interval()))
    }

    pub fn status(&self) -> &DaemonStatus {
        &self.status
    }

    pub fn runner(&self) -> &CycleRunner {
        &self.runner
    }

    /// Run cycles until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Daemon loop started, checking every {:.1}h",
            self.interval.as_secs_f64() / 3600.0
        );

        while !shutdown.is_cancelled() {
            let today = Local::now().date_naive();
            // Failures are already logged and counted
            let _ = self.run_once(today).await;

            match wait_for_next_cycle(self.interval, WAIT_SLICE, &shutdown).await {
                WaitOutcome::Elapsed => continue,
                WaitOutcome::Cancelled => break,
            }
        }

        info!(
            "Daemon loop exiting after {} cycles ({} failed)",
            self.status.total_cycles, self.status.failed_cycles
        );
        Ok(())
    }

    /// Run one cycle as of `today` and record its outcome
    pub async fn run_once(&mut self, today: NaiveDate) -> Result<CycleSummary> {
        debug!("Starting scheduled release check");
        let result = self.runner.run_cycle(today).await;

        self.status.total_cycles += 1;
        self.status.last_cycle = Some(Instant::now());

        match &result {
            Ok(summary) => {
                self.status.successful_cycles += 1;
                self.status.notified_total += summary.notified as u64;
                self.log_cycle_success(summary);
            }
            Err(e) => {
                self.status.failed_cycles += 1;
                self.log_cycle_failure(e);
            }
        }

        result
    }

    fn log_cycle_success(&self, summary: &CycleSummary) {
        info!(
            "Release check finished: {} new events ({} total since startup), next check in {:.1}h",
            summary.notified,
            self.status.notified_total,
            self.interval.as_secs_f64() / 3600.0
        );
    }

    fn log_cycle_failure(&self, error: &anyhow::Error) {
        error!("Release check failed: {:?}", error);
    }
}

/// Build a cycle runner from configuration without touching the network
///
/// The store is bound to its path but not loaded.
pub fn build_runner(config: &Config, notifier: Box<dyn Notifier>) -> Result<CycleRunner> {
    let catalog = StremioClient::new(&config.catalog).context("Failed to create Stremio client")?;
    let metadata =
        CinemetaClient::new(&config.metadata).context("Failed to create Cinemeta client")?;
    let checker = ReleaseChecker::new(Box::new(metadata)).with_request_delay(config.request_delay());

    Ok(CycleRunner::new(
        Box::new(catalog),
        checker,
        notifier,
        ReleaseStore::new(config.state_path()),
        CycleSettings::from_config(config),
    ))
}

/// Startup sequence: calendar API check, catalog login, then state
pub async fn connect(config: &Config) -> Result<CycleRunner> {
    let calendar =
        HomeAssistantCalendar::new(&config.calendar).context("Failed to create calendar client")?;
    calendar
        .check_connection()
        .await
        .context("Cannot reach the Home Assistant API")?;
    info!("Using calendar {}", calendar.calendar_id());

    let mut runner = build_runner(config, Box::new(calendar))?;
    runner.authenticate().await?;

    let store = runner.store_mut();
    if config.schedule.force_refresh {
        warn!("Force refresh enabled, forgetting all recorded notifications");
        store.clear();
        store
            .save()
            .context("Failed to reset notification state")?;
    } else {
        store.load();
    }

    Ok(runner)
}

/// Wait `interval` in `slice`-sized steps, returning early on cancellation
pub async fn wait_for_next_cycle(
    interval: Duration,
    slice: Duration,
    shutdown: &CancellationToken,
) -> WaitOutcome {
    let slice = if slice.is_zero() { interval } else { slice };
    let mut remaining = interval;

    while !remaining.is_zero() {
        let step = remaining.min(slice);
        tokio::select! {
            _ = shutdown.cancelled() => return WaitOutcome::Cancelled,
            _ = tokio::time::sleep(step) => {}
        }
        remaining -= step;
    }

    if shutdown.is_cancelled() {
        WaitOutcome::Cancelled
    } else {
        WaitOutcome::Elapsed
    }
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
pub fn spawn_signal_handler(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, stopping after the current cycle");
        shutdown.cancel();
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => debug!("Ctrl+C received"),
                    _ = terminate.recv() => debug!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
