/// Protocol-specific probes
///
/// Each prober executes one configured check and returns a `CheckResult`.
/// Network failures never escape a prober: they are classified as `DOWN`.
/// Only configuration problems (such as an unparsable target) are returned
/// as errors, aborting the current cycle.
pub mod certificate;
mod connect_timing;
pub mod dns;
pub mod http;
pub mod tcp;

pub use dns::DnsProber;
pub use http::HttpProber;
pub use tcp::TcpProber;

use std::error::Error as StdError;
use std::time::Duration;

use crate::error::Result;
use crate::types::{CheckConfiguration, CheckResult, CheckType};

/// Prober trait for the different types of checks
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this prober handles `check_type`
    fn supports(&self, check_type: CheckType) -> bool;

    /// Perform the check described by `config`
    async fn execute(&self, config: &CheckConfiguration) -> Result<CheckResult>;
}

/// Render an error with its whole source chain, `outer: inner: root`
pub(crate) fn describe_error(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

pub(crate) fn timeout_message(what: &str, timeout: Duration) -> String {
    format!("{what} timed out after {}ms", timeout.as_millis())
}
