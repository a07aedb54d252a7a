//! Check-configuration validation.
//!
//! Configurations are validated before they reach the schedule registry so
//! that a malformed entry is rejected once instead of failing on every tick.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};
use crate::target;
use crate::types::{CheckConfiguration, CheckType, duration_millis};

/// Validates a configuration for scheduling
pub fn validate_configuration(config: &CheckConfiguration) -> Result<()> {
    if config.id.as_str().trim().is_empty() {
        return Err(Error::configuration("check id must not be empty"));
    }

    validate_schedule(config.frequency, config.timeout)?;

    if let Some(code) = config.expected_status_code {
        validate_status_code(code)?;
    }

    validate_target(config.check_type, &config.resource_url)?;

    if config.timeout > config.frequency {
        warn!(
            check_id = %config.id,
            timeout_ms = duration_millis(config.timeout),
            frequency_ms = duration_millis(config.frequency),
            "Check timeout exceeds its frequency - executions may be skipped"
        );
    }

    Ok(())
}

/// Frequency and timeout must both be positive
pub fn validate_schedule(frequency: Duration, timeout: Duration) -> Result<()> {
    if frequency.is_zero() {
        return Err(Error::configuration("check frequency must be greater than zero"));
    }

    if timeout.is_zero() {
        return Err(Error::configuration("check timeout must be greater than zero"));
    }

    Ok(())
}

/// Validates a target based on its check type
pub fn validate_target(check_type: CheckType, resource_url: &str) -> Result<()> {
    match check_type {
        CheckType::Http | CheckType::Https => target::http_url(resource_url).map(|_| ()),
        CheckType::Tcp => target::host_port(resource_url).map(|_| ()),
        CheckType::Dns => target::hostname(resource_url).map(|_| ()),
    }
}

fn validate_status_code(code: u16) -> Result<()> {
    if !(100..=599).contains(&code) {
        return Err(Error::configuration(format!(
            "expected status code {code} is outside 100-599"
        )));
    }
    Ok(())
}
