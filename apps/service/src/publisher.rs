use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};
use vigil::{CheckResult, ResultPublisher, duration_millis};

/// Up/down totals observed by a [`LogPublisher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishTotals {
    pub up: u64,
    pub down: u64,
}

/// Publishes results to the log and counts them
#[derive(Debug, Default)]
pub struct LogPublisher {
    up: AtomicU64,
    down: AtomicU64,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> PublishTotals {
        PublishTotals { up: self.up.load(Ordering::Relaxed), down: self.down.load(Ordering::Relaxed) }
    }
}

#[async_trait]
impl ResultPublisher for LogPublisher {
    async fn publish(&self, result: CheckResult) -> anyhow::Result<()> {
        let response_time_ms = duration_millis(result.response_time);
        let metrics = result.metrics.clone().unwrap_or_default();

        if result.is_up() {
            self.up.fetch_add(1, Ordering::Relaxed);
            info!(
                check_id = %result.check_id,
                resource_url = %result.resource_url,
                response_time_ms,
                status_code = result.http_status_code,
                ssl_valid = metrics.ssl_valid,
                ssl_expiration = ?metrics.ssl_expiration_date,
                partial_error = result.error_message.as_deref(),
                "Check up"
            );
        } else {
            self.down.fetch_add(1, Ordering::Relaxed);
            warn!(
                check_id = %result.check_id,
                resource_url = %result.resource_url,
                response_time_ms,
                status_code = result.http_status_code,
                error = result.error_message.as_deref().unwrap_or("unknown error"),
                "Check down"
            );
        }

        Ok(())
    }
}
