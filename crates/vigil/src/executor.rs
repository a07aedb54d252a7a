use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::probe::{DnsProber, HttpProber, Prober, TcpProber};
use crate::types::{CheckConfiguration, CheckResult, CheckType};

/// Executor dispatch - resolves a check type to the prober that runs it
///
/// Probers are registered in order; for every check type the first prober
/// that supports it wins. Resolution is a table lookup keyed by `CheckType`.
pub struct ExecutorDispatch {
    probers: Vec<Arc<dyn Prober>>,
    table: HashMap<CheckType, Arc<dyn Prober>>,
}

impl ExecutorDispatch {
    /// Create a dispatch table from an ordered list of probers
    pub fn new(probers: Vec<Arc<dyn Prober>>) -> Self {
        let mut table: HashMap<CheckType, Arc<dyn Prober>> = HashMap::new();
        for prober in &probers {
            for check_type in CheckType::ALL {
                if prober.supports(check_type) {
                    table.entry(check_type).or_insert_with(|| Arc::clone(prober));
                }
            }
        }

        Self { probers, table }
    }

    /// HTTP/HTTPS, TCP and DNS probers with default settings
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(HttpProber::new()),
            Arc::new(TcpProber::new()),
            Arc::new(DnsProber::from_system_conf()),
        ])
    }

    /// Prober registered for `check_type`
    pub fn resolve(&self, check_type: CheckType) -> Result<Arc<dyn Prober>> {
        self.table
            .get(&check_type)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("no prober registered for check type {check_type}")))
    }

    /// Resolve a raw, case-insensitive type name
    pub fn resolve_name(&self, name: Option<&str>) -> Result<Arc<dyn Prober>> {
        let name = name.ok_or_else(|| Error::configuration("check type is missing"))?;
        self.resolve(name.parse()?)
    }

    /// Resolve the prober for `config` and run it
    pub async fn execute(&self, config: &CheckConfiguration) -> Result<CheckResult> {
        let prober = self.resolve(config.check_type)?;
        debug!(check_id = %config.id, prober = prober.name(), "Executing check");
        prober.execute(config).await
    }

    /// Names of registered probers, in registration order
    pub fn registered(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.probers.iter().map(|prober| prober.name())
    }
}
