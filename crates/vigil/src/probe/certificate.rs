//! Leaf certificate inspection for HTTPS probes.

use chrono::{DateTime, Utc};
use reqwest::tls::TlsInfo;
use thiserror::Error;
use tracing::debug;
use x509_parser::prelude::*;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no TLS session information available")]
    NoTlsInfo,

    #[error("server presented no certificate")]
    NoPeerCertificate,

    #[error("failed to parse X.509 certificate: {0}")]
    Parse(String),

    #[error("certificate is not valid before {0}")]
    NotYetValid(DateTime<Utc>),

    #[error("certificate expired on {0}")]
    Expired(DateTime<Utc>),
}

/// Validity details of a server's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateSummary {
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.not_after.signed_duration_since(now).num_days()
    }
}

/// Inspect the leaf certificate recorded on a response's TLS session
pub fn inspect_tls_info(
    info: Option<&TlsInfo>,
    now: DateTime<Utc>,
) -> Result<CertificateSummary, CertificateError> {
    let info = info.ok_or(CertificateError::NoTlsInfo)?;
    let der = info.peer_certificate().ok_or(CertificateError::NoPeerCertificate)?;
    inspect_der(der, now)
}

/// Parse a DER certificate and check its validity window against `now`
pub fn inspect_der(der: &[u8], now: DateTime<Utc>) -> Result<CertificateSummary, CertificateError> {
    let (_, x509) =
        parse_x509_certificate(der).map_err(|e| CertificateError::Parse(e.to_string()))?;

    let validity = x509.validity();
    let summary = CertificateSummary {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before: asn1_time_to_utc(&validity.not_before),
        not_after: asn1_time_to_utc(&validity.not_after),
    };

    debug!(
        subject = %summary.subject,
        issuer = %summary.issuer,
        days_left = summary.days_until_expiry(now),
        "Parsed server certificate"
    );

    if now < summary.not_before {
        return Err(CertificateError::NotYetValid(summary.not_before));
    }
    if now > summary.not_after {
        return Err(CertificateError::Expired(summary.not_after));
    }

    Ok(summary)
}

fn asn1_time_to_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}
