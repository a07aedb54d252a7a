use std::time::Instant;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Prober, timeout_message};
use crate::error::Result;
use crate::target;
use crate::types::{CheckConfiguration, CheckResult, CheckType};

/// DNS forward-resolution checker
///
/// A fresh resolver is created per execution so that every probe performs a
/// real query instead of answering from a cache.
#[derive(Debug, Clone)]
pub struct DnsProber {
    config: ResolverConfig,
    options: ResolverOpts,
}

impl Default for DnsProber {
    fn default() -> Self {
        Self::from_system_conf()
    }
}

impl DnsProber {
    pub fn new(config: ResolverConfig, options: ResolverOpts) -> Self {
        Self { config, options }
    }

    /// Use the host's resolver configuration, falling back to public defaults
    pub fn from_system_conf() -> Self {
        match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, options)) => Self::new(config, options),
            Err(e) => {
                warn!(error = %e, "Failed to read system resolver configuration, using defaults");
                Self::new(ResolverConfig::default(), ResolverOpts::default())
            }
        }
    }

    fn resolver(&self, config: &CheckConfiguration) -> TokioAsyncResolver {
        let mut options = self.options.clone();
        options.timeout = config.timeout;
        options.attempts = 1;
        TokioAsyncResolver::tokio(self.config.clone(), options)
    }
}

#[async_trait::async_trait]
impl Prober for DnsProber {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn supports(&self, check_type: CheckType) -> bool {
        check_type == CheckType::Dns
    }

    async fn execute(&self, config: &CheckConfiguration) -> Result<CheckResult> {
        let host = target::hostname(&config.resource_url)?;
        let resolver = self.resolver(config);
        let result = CheckResult::new(config);

        let start = Instant::now();
        let outcome = timeout(config.timeout, resolver.lookup_ip(host.as_str())).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(Ok(lookup)) => {
                let addresses: Vec<_> = lookup.iter().collect();
                if addresses.is_empty() {
                    result.down(elapsed, format!("no addresses found for host {host}"))
                } else {
                    debug!(check_id = %config.id, %host, count = addresses.len(), "Resolved host");
                    result.up(elapsed)
                }
            }
            Ok(Err(e)) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    result.down(elapsed, format!("no addresses found for host {host}: {e}"))
                }
                _ => result.down(elapsed, format!("DNS resolution of {host} failed: {e}")),
            },
            Err(_) => result.down(elapsed, timeout_message(&format!("DNS resolution of {host}"), config.timeout)),
        };

        Ok(result)
    }
}
