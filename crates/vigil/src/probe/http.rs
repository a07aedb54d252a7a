use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::redirect::Policy;
use reqwest::tls::TlsInfo;
use reqwest::{Certificate, Client};
use tracing::{debug, warn};

use super::certificate::{CertificateError, CertificateSummary, inspect_tls_info};
use super::connect_timing::ConnectTimer;
use super::{Prober, describe_error, timeout_message};
use crate::error::Result;
use crate::target;
use crate::types::{CheckConfiguration, CheckResult, CheckType, ProbeMetrics, duration_millis};

const MAX_REDIRECTS: usize = 10;

/// HTTP/HTTPS checker
///
/// A client is built per execution because connect and read timeouts come
/// from each check's configuration. Idle pooling is disabled so the
/// connection is closed once the response is dropped, and proxies are
/// bypassed so the timed connection goes to the target itself.
///
/// Certificates are always verified against the system roots plus any
/// roots added with [`HttpProber::with_root_certificate`]; `validate_ssl`
/// only turns on inspection of the leaf certificate.
#[derive(Clone)]
pub struct HttpProber {
    user_agent: String,
    root_certificates: Vec<Certificate>,
}

impl fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProber")
            .field("user_agent", &self.user_agent)
            .field("root_certificates", &self.root_certificates.len())
            .finish()
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProber {
    pub fn new() -> Self {
        Self::with_user_agent(crate::USER_AGENT)
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self { user_agent: user_agent.into(), root_certificates: Vec::new() }
    }

    /// Trust `certificate` in addition to the system roots
    pub fn with_root_certificate(mut self, certificate: Certificate) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    fn build_client(&self, config: &CheckConfiguration, https: bool, timer: &ConnectTimer) -> reqwest::Result<Client> {
        let builder = self
            .root_certificates
            .iter()
            .cloned()
            .fold(Client::builder(), |builder, certificate| builder.add_root_certificate(certificate));

        builder
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(self.user_agent.as_str())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(0)
            .no_proxy()
            .tls_info(https && config.validate_ssl)
            .connector_layer(timer.clone())
            .build()
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, check_type: CheckType) -> bool {
        matches!(check_type, CheckType::Http | CheckType::Https)
    }

    async fn execute(&self, config: &CheckConfiguration) -> Result<CheckResult> {
        let url = target::http_url(&config.resource_url)?;
        let https = url.scheme() == "https";
        let port = url.port_or_known_default().unwrap_or(if https { 443 } else { 80 });
        let authority = format!("{}:{port}", url.host_str().unwrap_or_default());

        let result = CheckResult::new(config);
        let start = Instant::now();
        let timer = ConnectTimer::new();

        let client = match self.build_client(config, https, &timer) {
            Ok(client) => client,
            Err(e) => {
                warn!(check_id = %config.id, error = %e, "Failed to build HTTP client");
                return Ok(result.down(start.elapsed(), format!("HTTP client error: {}", describe_error(&e))));
            }
        };

        let request_start = Instant::now();
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let message = request_failure(&e, &authority, config.timeout);
                let metrics = ProbeMetrics { connection_time: timer.elapsed(), ..Default::default() };
                return Ok(result.down(start.elapsed(), message).with_metrics(metrics));
            }
        };

        let time_to_first_byte = request_start.elapsed();
        let response_time = start.elapsed();
        let status_code = response.status().as_u16();

        let mut result = match classify_status(status_code, config.expected_status_code) {
            Ok(()) => result.up(response_time),
            Err(message) => result.down(response_time, message),
        }
        .with_status_code(status_code);

        let mut metrics = ProbeMetrics {
            connection_time: timer.elapsed(),
            time_to_first_byte: Some(time_to_first_byte),
            ..Default::default()
        };

        if https && config.validate_ssl {
            let inspection = inspect_tls_info(response.extensions().get::<TlsInfo>(), Utc::now());
            record_certificate(&mut result, &mut metrics, inspection);
        }

        drop(response);

        if let Some(expected) = config.expected_response_time {
            if response_time > expected {
                debug!(
                    check_id = %config.id,
                    response_time_ms = duration_millis(response_time),
                    expected_ms = duration_millis(expected),
                    "Response slower than expected"
                );
            }
        }

        Ok(result.with_metrics(metrics))
    }
}

fn request_failure(error: &reqwest::Error, authority: &str, timeout: Duration) -> String {
    match (error.is_connect(), error.is_timeout()) {
        (true, true) => timeout_message(&format!("Connection to {authority}"), timeout),
        (true, false) => format!("Connection to {authority} failed: {}", describe_error(error)),
        (false, true) => timeout_message("HTTP request", timeout),
        (false, false) => format!("HTTP request failed: {}", describe_error(error)),
    }
}

/// Record a certificate inspection outcome; `status` is left as classified
fn record_certificate(
    result: &mut CheckResult,
    metrics: &mut ProbeMetrics,
    inspection: std::result::Result<CertificateSummary, CertificateError>,
) {
    match inspection {
        Ok(certificate) => {
            metrics.ssl_valid = Some(true);
            metrics.ssl_expiration_date = Some(certificate.not_after);
        }
        Err(e) => {
            debug!(check_id = %result.check_id, error = %e, "SSL inspection failed");
            metrics.ssl_valid = Some(false);
            result.append_error(format!("SSL validation failed: {e}"));
        }
    }
}

/// Up iff the code is 2xx and matches the expected code, when one is set
pub(crate) fn classify_status(code: u16, expected: Option<u16>) -> std::result::Result<(), String> {
    match expected {
        Some(expected) if expected != code => {
            Err(format!("Unexpected HTTP status code {code} (expected {expected})"))
        }
        _ if !(200..300).contains(&code) => Err(format!("HTTP status code {code} indicates failure")),
        _ => Ok(()),
    }
}
