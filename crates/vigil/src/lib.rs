//! Vigil - recurring availability checks for network resources
//!
//! This library schedules HTTP/HTTPS, TCP and DNS probes per resource,
//! classifies every execution as up or down and hands the results to a
//! publisher supplied by the embedding process.

pub mod error;
pub mod executor;
pub mod probe;
pub mod results;
pub mod scheduler;
pub mod settings;
pub mod target;
pub mod types;
pub mod validation;

// Re-export main types
pub use error::{Error, Result};
pub use executor::ExecutorDispatch;
pub use probe::{DnsProber, HttpProber, Prober, TcpProber};
pub use results::{ChannelPublisher, ResultPublisher};
pub use scheduler::{ReconcileReport, RegistryOptions, ScheduleRegistry, TaskPhase};
pub use settings::{ChangeAction, ChangeNotification, MemorySettings, SettingsSource};
pub use types::{
    CheckConfiguration, CheckId, CheckResult, CheckStatus, CheckType, ProbeMetrics, duration_millis,
};

/// User agent sent with HTTP probes
pub const USER_AGENT: &str = concat!("vigil/", env!("CARGO_PKG_VERSION"));

/// Default number of probes allowed to run at the same time
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 32;
