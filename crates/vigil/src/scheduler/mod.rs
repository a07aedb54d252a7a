/// Schedule registry - owns one recurring task per check configuration
///
/// Tasks fire at a fixed rate (`frequency` measured from the nominal start,
/// first execution immediate) and run on a bounded worker pool shared by all
/// checks. A tick that arrives while the previous execution of the same
/// check is still running is skipped, so one check never overlaps itself.
mod task;
mod task_map;

pub use task::TaskPhase;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use self::task::{ScheduledTask, TaskState};
use self::task_map::TaskMap;
use crate::error::{Error, Result};
use crate::executor::ExecutorDispatch;
use crate::results::ResultPublisher;
use crate::settings::{ChangeAction, ChangeNotification, SettingsSource};
use crate::types::{CheckConfiguration, CheckId, duration_millis};
use crate::validation::validate_schedule;

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Upper bound on probes executing at the same time, across all checks
    pub max_concurrent_probes: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self { max_concurrent_probes: crate::DEFAULT_MAX_CONCURRENT_PROBES }
    }
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Configurations returned by the settings source
    pub listed: usize,
    /// Previously untracked configurations that were scheduled
    pub scheduled: usize,
    /// Tracked configurations whose listed version differs from the running one
    pub drifted: usize,
    /// Configurations that could not be scheduled
    pub rejected: usize,
}

/// Everything a single execution needs, shared by all tasks
#[derive(Clone)]
struct CycleContext {
    dispatch: Arc<ExecutorDispatch>,
    publisher: Arc<dyn ResultPublisher>,
    workers: Arc<Semaphore>,
}

pub struct ScheduleRegistry {
    context: CycleContext,
    settings: Arc<dyn SettingsSource>,
    tasks: TaskMap,
}

impl ScheduleRegistry {
    /// Create a new schedule registry
    pub fn new(
        dispatch: Arc<ExecutorDispatch>,
        settings: Arc<dyn SettingsSource>,
        publisher: Arc<dyn ResultPublisher>,
        options: RegistryOptions,
    ) -> Self {
        let permits = options.max_concurrent_probes.max(1);
        Self {
            context: CycleContext { dispatch, publisher, workers: Arc::new(Semaphore::new(permits)) },
            settings,
            tasks: TaskMap::new(),
        }
    }

    /// Schedule `config`, replacing and cancelling any task with the same id
    pub fn upsert(&self, config: CheckConfiguration) -> Result<()> {
        validate_schedule(config.frequency, config.timeout)?;

        let id = config.id.clone();
        let config = Arc::new(config);
        let frequency_ms = duration_millis(config.frequency);
        let replaced = self.tasks.replace_with(id.clone(), |guard| self.spawn_task(config, guard));

        if replaced {
            info!(check_id = %id, frequency_ms, "Rescheduled check");
        } else {
            info!(check_id = %id, frequency_ms, "Scheduled check");
        }
        Ok(())
    }

    /// Cancel and forget the task for `id`. Returns whether one existed.
    pub fn remove(&self, id: &CheckId) -> bool {
        match self.tasks.remove(id) {
            Some(task) => {
                task.cancel();
                info!(check_id = %id, "Unscheduled check");
                true
            }
            None => {
                debug!(check_id = %id, "Remove requested for unscheduled check");
                false
            }
        }
    }

    /// Apply a change notification from the settings source
    pub fn apply(&self, notification: ChangeNotification) -> Result<()> {
        match notification.action {
            ChangeAction::Create | ChangeAction::Update => {
                let config = notification.configuration.ok_or_else(|| {
                    Error::configuration(format!(
                        "{:?} notification for {} carries no configuration",
                        notification.action, notification.check_id
                    ))
                })?;
                if config.id != notification.check_id {
                    return Err(Error::configuration(format!(
                        "{:?} notification for {} carries the configuration of {}",
                        notification.action, notification.check_id, config.id
                    )));
                }
                self.upsert(config)
            }
            ChangeAction::Delete => {
                self.remove(&notification.check_id);
                Ok(())
            }
        }
    }

    /// Schedule every listed configuration that is not tracked yet.
    ///
    /// Changes to already scheduled checks are only reported, never applied;
    /// they are expected to arrive through change notifications.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let configs = self.settings.list_configurations().await.map_err(|e| Error::Settings(e.into()))?;

        let mut report = ReconcileReport { listed: configs.len(), ..Default::default() };
        for config in configs {
            if let Err(e) = validate_schedule(config.frequency, config.timeout) {
                warn!(check_id = %config.id, error = %e, "Skipping invalid configuration during reconcile");
                report.rejected += 1;
                continue;
            }

            let id = config.id.clone();
            let config = Arc::new(config);
            match self.tasks.insert_if_absent(id.clone(), || self.spawn_task(Arc::clone(&config), None)) {
                Ok(()) => {
                    info!(check_id = %id, "Reconcile scheduled missing check");
                    report.scheduled += 1;
                }
                Err(running) if *running != *config => {
                    warn!(check_id = %id, "Listed configuration differs from the scheduled one; not applied");
                    report.drifted += 1;
                }
                Err(_) => {}
            }
        }

        debug!(?report, tracked = self.tasks.len(), "Reconcile finished");
        Ok(report)
    }

    pub fn contains(&self, id: &CheckId) -> bool {
        self.tasks.contains(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted ids of every scheduled check
    pub fn scheduled_ids(&self) -> Vec<CheckId> {
        self.tasks.ids()
    }

    /// Configuration the task for `id` was scheduled with
    pub fn configuration(&self, id: &CheckId) -> Option<CheckConfiguration> {
        self.tasks.with_task(id, |task| task.config().as_ref().clone())
    }

    pub fn phase(&self, id: &CheckId) -> Option<TaskPhase> {
        self.tasks.with_task(id, ScheduledTask::phase)
    }

    /// Cancel every task. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let tasks = self.tasks.drain();
        for task in &tasks {
            task.cancel();
        }
        info!(count = tasks.len(), "Cancelled all scheduled checks");
        tasks.len()
    }

    /// Spawn the ticker for `config`. A replacement passes the running guard
    /// of the task it replaces so executions of one check never overlap.
    fn spawn_task(&self, config: Arc<CheckConfiguration>, guard: Option<Arc<TaskState>>) -> ScheduledTask {
        let state = guard.unwrap_or_default();
        let cancelled = Arc::new(AtomicBool::new(false));
        let ticker = tokio::spawn(run_ticker(
            self.context.clone(),
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::clone(&cancelled),
        ));
        ScheduledTask::new(config, state, cancelled, ticker)
    }
}

async fn run_ticker(
    context: CycleContext,
    config: Arc<CheckConfiguration>,
    state: Arc<TaskState>,
    cancelled: Arc<AtomicBool>,
) {
    let mut timer = interval(config.frequency);
    timer.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        timer.tick().await;

        if cancelled.load(Ordering::Acquire) {
            break;
        }
        if !state.try_begin() {
            debug!(check_id = %config.id, "Previous execution still running, skipping tick");
            continue;
        }

        tokio::spawn(run_cycle(context.clone(), Arc::clone(&config), Arc::clone(&state)));
    }
}

/// One execution; every failure, including a panic, ends here
async fn run_cycle(context: CycleContext, config: Arc<CheckConfiguration>, state: Arc<TaskState>) {
    let outcome = AssertUnwindSafe(execute_cycle(&context, &config)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_configuration() => {
            warn!(check_id = %config.id, error = %e, "Check cycle aborted by configuration error");
        }
        Ok(Err(e)) => {
            error!(check_id = %config.id, error = %e, "Check cycle failed");
        }
        Err(panic) => {
            let e = Error::Panicked(panic_message(panic.as_ref()));
            error!(check_id = %config.id, error = %e, "Check cycle failed");
        }
    }

    state.finish();
}

async fn execute_cycle(context: &CycleContext, config: &CheckConfiguration) -> Result<()> {
    let prober = context.dispatch.resolve(config.check_type)?;

    let result = {
        let _permit = context.workers.acquire().await.map_err(|_| Error::WorkerPoolClosed)?;
        prober.execute(config).await?
    };

    debug!(
        check_id = %result.check_id,
        status = %result.status,
        response_time_ms = duration_millis(result.response_time),
        "Check executed"
    );

    context.publisher.publish(result).await.map_err(|e| Error::Publish(e.into()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
