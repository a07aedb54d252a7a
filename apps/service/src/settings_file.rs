//! File-backed settings source and its change feed
//!
//! The checks file holds one `[[checks]]` table per configuration:
//!
//! ```toml
//! [[checks]]
//! id = "api"
//! type = "https"
//! resource_url = "https://api.example.com/health"
//! frequency_ms = 30000
//! timeout_ms = 5000
//! expected_status_code = 200
//! validate_ssl = true
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil::validation::validate_configuration;
use vigil::{ChangeNotification, CheckConfiguration, CheckId, SettingsSource};

pub type Snapshot = BTreeMap<CheckId, CheckConfiguration>;

#[derive(Debug, Default, Deserialize)]
struct ChecksFile {
    #[serde(default)]
    checks: Vec<toml::Value>,
}

pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the checks file. A missing file is an empty set.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Checks file not found, no checks configured");
                return Ok(Snapshot::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read checks file {}", self.path.display()));
            }
        };

        parse_checks(&raw).with_context(|| format!("failed to parse checks file {}", self.path.display()))
    }

    /// Poll the checks file and send a notification for every change
    /// against `initial`. Unreadable files keep the previous snapshot.
    pub fn watch(
        self: Arc<Self>,
        interval: Duration,
        initial: Snapshot,
        tx: mpsc::Sender<ChangeNotification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous = initial;

            loop {
                ticker.tick().await;

                let current = match self.snapshot().await {
                    Ok(current) => current,
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "Failed to reload checks file");
                        continue;
                    }
                };

                let changes = diff(&previous, &current);
                if !changes.is_empty() {
                    info!(changes = changes.len(), "Checks file changed");
                }
                for change in changes {
                    if tx.send(change).await.is_err() {
                        debug!("Change feed receiver dropped, stopping watcher");
                        return;
                    }
                }
                previous = current;
            }
        })
    }
}

#[async_trait]
impl SettingsSource for FileSettings {
    async fn list_configurations(&self) -> Result<Vec<CheckConfiguration>> {
        Ok(self.snapshot().await?.into_values().collect())
    }
}

/// Parse a checks file. Invalid entries are logged and skipped, duplicate
/// ids keep the first entry.
pub fn parse_checks(raw: &str) -> Result<Snapshot> {
    let file: ChecksFile = toml::from_str(raw)?;
    let mut snapshot = Snapshot::new();

    for (index, entry) in file.checks.into_iter().enumerate() {
        let config: CheckConfiguration = match entry.try_into() {
            Ok(config) => config,
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed check entry");
                continue;
            }
        };

        if let Err(e) = validate_configuration(&config) {
            warn!(index, check_id = %config.id, error = %e, "Skipping invalid check entry");
            continue;
        }

        if snapshot.contains_key(&config.id) {
            warn!(index, check_id = %config.id, "Duplicate check id, keeping the first entry");
            continue;
        }
        snapshot.insert(config.id.clone(), config);
    }

    Ok(snapshot)
}

/// Notifications turning `previous` into `current`: deletions first, then
/// creations and updates in id order.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeNotification> {
    let mut changes: Vec<ChangeNotification> = previous
        .keys()
        .filter(|id| !current.contains_key(*id))
        .map(|id| ChangeNotification::deleted(id.clone()))
        .collect();

    for (id, config) in current {
        match previous.get(id) {
            None => changes.push(ChangeNotification::created(config.clone())),
            Some(old) if old != config => changes.push(ChangeNotification::updated(config.clone())),
            Some(_) => {}
        }
    }

    changes
}
