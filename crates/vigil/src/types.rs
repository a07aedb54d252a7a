use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stable identifier of a check configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CheckId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Type of monitoring check to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CheckType {
    Http,
    Https,
    Tcp,
    Dns,
}

impl CheckType {
    pub const ALL: [CheckType; 4] = [CheckType::Http, CheckType::Https, CheckType::Tcp, CheckType::Dns];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckType::Http => "HTTP",
            CheckType::Https => "HTTPS",
            CheckType::Tcp => "TCP",
            CheckType::Dns => "DNS",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = Error;

    /// Case-insensitive; blank and unknown names are configuration errors.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(Error::configuration("check type must not be empty"));
        }

        CheckType::ALL
            .into_iter()
            .find(|check_type| check_type.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::configuration(format!("unsupported check type: {name}")))
    }
}

impl TryFrom<String> for CheckType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CheckType> for String {
    fn from(check_type: CheckType) -> Self {
        check_type.as_str().to_string()
    }
}

/// Per-resource check configuration, owned by the settings source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfiguration {
    pub id: CheckId,

    #[serde(rename = "type")]
    pub check_type: CheckType,

    /// Scheme-qualified target (`https://host/path`, `tcp://host:port`, `dns://host`)
    pub resource_url: String,

    #[serde(rename = "frequency_ms", with = "millis")]
    pub frequency: Duration,

    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,

    #[serde(default)]
    pub expected_status_code: Option<u16>,

    /// Advisory only, never changes the status of a result
    #[serde(default, rename = "expected_response_time_ms", with = "millis::option")]
    pub expected_response_time: Option<Duration>,

    #[serde(default)]
    pub validate_ssl: bool,
}

impl CheckConfiguration {
    pub fn new(
        id: impl Into<CheckId>,
        check_type: CheckType,
        resource_url: impl Into<String>,
        frequency: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            check_type,
            resource_url: resource_url.into(),
            frequency,
            timeout,
            expected_status_code: None,
            expected_response_time: None,
            validate_ssl: false,
        }
    }

    pub fn with_expected_status(mut self, code: u16) -> Self {
        self.expected_status_code = Some(code);
        self
    }

    pub fn with_expected_response_time(mut self, response_time: Duration) -> Self {
        self.expected_response_time = Some(response_time);
        self
    }

    pub fn with_ssl_validation(mut self, validate_ssl: bool) -> Self {
        self.validate_ssl = validate_ssl;
        self
    }
}

/// Status of a monitoring check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "UP"),
            CheckStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Timing and certificate details gathered while probing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetrics {
    #[serde(rename = "connection_time_ms", with = "millis::option", skip_serializing_if = "Option::is_none", default)]
    pub connection_time: Option<Duration>,

    #[serde(rename = "time_to_first_byte_ms", with = "millis::option", skip_serializing_if = "Option::is_none", default)]
    pub time_to_first_byte: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssl_valid: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssl_expiration_date: Option<DateTime<Utc>>,
}

/// Result of a single probe execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: CheckId,

    pub resource_url: String,

    /// When the probe was started
    pub timestamp: DateTime<Utc>,

    pub status: CheckStatus,

    /// Elapsed wall time, set on failures too
    #[serde(rename = "response_time_ms", with = "millis")]
    pub response_time: Duration,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub http_status_code: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<ProbeMetrics>,
}

impl CheckResult {
    /// Create a result for `config`, stamped now and marked down until classified
    pub fn new(config: &CheckConfiguration) -> Self {
        Self {
            check_id: config.id.clone(),
            resource_url: config.resource_url.clone(),
            timestamp: Utc::now(),
            status: CheckStatus::Down,
            response_time: Duration::ZERO,
            http_status_code: None,
            error_message: None,
            metrics: None,
        }
    }

    /// Mark the check as successful
    pub fn up(mut self, response_time: Duration) -> Self {
        self.status = CheckStatus::Up;
        self.response_time = response_time;
        self
    }

    /// Mark the check as failed with error
    pub fn down(mut self, response_time: Duration, error: impl Into<String>) -> Self {
        self.status = CheckStatus::Down;
        self.response_time = response_time;
        self.error_message = Some(error.into());
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.http_status_code = Some(status_code);
        self
    }

    pub fn with_metrics(mut self, metrics: ProbeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add detail to the error message without touching the status
    pub fn append_error(&mut self, detail: impl AsRef<str>) {
        let detail = detail.as_ref();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{existing}; {detail}"),
            None => detail.to_string(),
        });
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Durations as whole milliseconds on the wire
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::duration_millis(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}
