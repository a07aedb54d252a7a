/// Orchestrator module - wires the engine to the service's collaborators
///
/// The orchestrator:
/// - Loads the checks file and schedules every configured check
/// - Applies change notifications from the checks file watcher
/// - Reconciles the registry against the checks file periodically
/// - Cancels every task and reports totals on shutdown


use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vigil::{ExecutorDispatch, RegistryOptions, ScheduleRegistry};

use crate::config::Config;
use crate::publisher::{LogPublisher, PublishTotals};
use crate::settings_file::FileSettings;

const CHANGE_FEED_BUFFER: usize = 256;

/// Totals reported when the orchestrator stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub results: PublishTotals,
    pub cancelled: usize,
}

/// Main orchestrator for the Vigil service
pub struct Orchestrator {
    config: Config,
    checks_file: PathBuf,
    dispatch: Arc<ExecutorDispatch>,
}

impl Orchestrator {
    pub fn new(config: Config, checks_file: PathBuf) -> Self {
        Self { config, checks_file, dispatch: Arc::new(ExecutorDispatch::standard()) }
    }

    /// Run until Ctrl-C
    pub async fn start(config: Config, checks_file: PathBuf) -> Result<RunSummary> {
        Self::new(config, checks_file)
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                info!("Ctrl-C received, shutting down");
            })
            .await
    }

    /// Run until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        let settings = Arc::new(FileSettings::new(&self.checks_file));
        info!(checks_file = %settings.path().display(), "Starting Vigil orchestrator...");
        info!(probers = ?self.dispatch.registered().collect::<Vec<_>>(), "Probers registered");

        let publisher = Arc::new(LogPublisher::new());
        let registry = ScheduleRegistry::new(
            Arc::clone(&self.dispatch),
            settings.clone(),
            publisher.clone(),
            RegistryOptions { max_concurrent_probes: self.config.engine.max_concurrent_probes },
        );

        // Watcher baseline, taken before the initial listing
        let initial = settings.snapshot().await.context("failed to load checks")?;
        let report = registry.reconcile().await.context("initial schedule failed")?;
        info!(scheduled = report.scheduled, rejected = report.rejected, "Initial checks scheduled");

        let (change_tx, mut change_rx) = mpsc::channel(CHANGE_FEED_BUFFER);
        let watch_interval = Duration::from_secs(self.config.settings.watch_interval_secs.max(1));
        let watcher = settings.clone().watch(watch_interval, initial, change_tx);

        let reconcile_period = Duration::from_secs(self.config.engine.reconcile_interval_secs.max(1));
        let mut reconcile_interval = time::interval_at(time::Instant::now() + reconcile_period, reconcile_period);
        reconcile_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        info!("Orchestrator started successfully - processing change notifications");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(notification) = change_rx.recv() => {
                    let check_id = notification.check_id.clone();
                    let action = notification.action;
                    if let Err(e) = registry.apply(notification) {
                        warn!(%check_id, ?action, error = %e, "Failed to apply change notification");
                    }
                }

                _ = reconcile_interval.tick() => {
                    match registry.reconcile().await {
                        Ok(report) if report.scheduled > 0 || report.drifted > 0 => {
                            info!(
                                scheduled = report.scheduled,
                                drifted = report.drifted,
                                rejected = report.rejected,
                                "Reconcile found missed changes"
                            );
                        }
                        Ok(report) => debug!(listed = report.listed, "Reconcile found nothing to do"),
                        Err(e) => error!(error = %e, "Reconcile failed"),
                    }
                }
            }
        }

        watcher.abort();
        let cancelled = registry.shutdown();
        let summary = RunSummary { results: publisher.totals(), cancelled };
        info!(
            cancelled = summary.cancelled,
            up = summary.results.up,
            down = summary.results.down,
            "Orchestrator stopped"
        );

        Ok(summary)
    }
}
