//! Results collaborator boundary.
//!
//! Every completed probe is handed to a `ResultPublisher` exactly once per
//! execution. Delivery beyond that call is the publisher's concern: the
//! engine neither retries nor deduplicates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::CheckResult;

/// Consumer of check results
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, result: CheckResult) -> Result<()>;
}

/// Publisher forwarding results into a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<CheckResult>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<CheckResult>) -> Self {
        Self { tx }
    }

    /// Create a publisher and the receiving end of its channel
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<CheckResult>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ResultPublisher for ChannelPublisher {
    async fn publish(&self, result: CheckResult) -> Result<()> {
        self.tx.send(result).await.context("result channel closed")
    }
}
