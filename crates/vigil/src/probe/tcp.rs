use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{Prober, timeout_message};
use crate::error::Result;
use crate::target;
use crate::types::{CheckConfiguration, CheckResult, CheckType, ProbeMetrics};

/// TCP port checker
#[derive(Debug, Default, Clone)]
pub struct TcpProber;

impl TcpProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Prober for TcpProber {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn supports(&self, check_type: CheckType) -> bool {
        check_type == CheckType::Tcp
    }

    async fn execute(&self, config: &CheckConfiguration) -> Result<CheckResult> {
        let (host, port) = target::host_port(&config.resource_url)?;
        let result = CheckResult::new(config);

        let start = Instant::now();
        let outcome = timeout(config.timeout, TcpStream::connect((host.as_str(), port))).await;
        let elapsed = start.elapsed();

        let metrics = ProbeMetrics { connection_time: Some(elapsed), ..Default::default() };

        let result = match outcome {
            Ok(Ok(stream)) => {
                debug!(check_id = %config.id, %host, port, "TCP connection established");
                drop(stream);
                result.up(elapsed)
            }
            Ok(Err(e)) => result.down(elapsed, format!("TCP connection to {host}:{port} failed: {e}")),
            Err(_) => result.down(
                elapsed,
                timeout_message(&format!("TCP connection to {host}:{port}"), config.timeout),
            ),
        };

        Ok(result.with_metrics(metrics))
    }
}
