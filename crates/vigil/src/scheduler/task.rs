use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use crate::types::CheckConfiguration;

/// Execution phase of a scheduled check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Idle,
    Running,
    Cancelled,
}

/// Running guard of one check id: `Idle <-> Running`.
///
/// Shared by a task and the task replacing it, so a replacement never
/// starts while the previous configuration's execution is still running.
#[derive(Debug, Default)]
pub(crate) struct TaskState {
    running: AtomicBool,
}

impl TaskState {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the next execution; fails while one is running
    pub(crate) fn try_begin(&self) -> bool {
        self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    pub(crate) fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// A check bound to its recurring ticker
pub(crate) struct ScheduledTask {
    config: Arc<CheckConfiguration>,
    state: Arc<TaskState>,
    cancelled: Arc<AtomicBool>,
    ticker: JoinHandle<()>,
}

impl ScheduledTask {
    pub(crate) fn new(
        config: Arc<CheckConfiguration>,
        state: Arc<TaskState>,
        cancelled: Arc<AtomicBool>,
        ticker: JoinHandle<()>,
    ) -> Self {
        Self { config, state, cancelled, ticker }
    }

    pub(crate) fn config(&self) -> &Arc<CheckConfiguration> {
        &self.config
    }

    pub(crate) fn state(&self) -> &Arc<TaskState> {
        &self.state
    }

    pub(crate) fn phase(&self) -> TaskPhase {
        if self.cancelled.load(Ordering::Acquire) {
            TaskPhase::Cancelled
        } else if self.state.is_running() {
            TaskPhase::Running
        } else {
            TaskPhase::Idle
        }
    }

    /// Stop future ticks. An execution already in flight runs to completion.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.ticker.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
