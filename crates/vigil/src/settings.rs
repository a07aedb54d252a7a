//! Settings collaborator boundary.
//!
//! The settings source owns check configurations. The engine reads them in
//! two ways: discrete change notifications, applied through
//! `ScheduleRegistry::apply`, and a periodic bulk listing used by
//! `ScheduleRegistry::reconcile`.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{CheckConfiguration, CheckId};

/// Source of the full, current configuration set
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn list_configurations(&self) -> Result<Vec<CheckConfiguration>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// A single configuration change published by the settings source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub action: ChangeAction,
    pub check_id: CheckId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<CheckConfiguration>,
}

impl ChangeNotification {
    pub fn created(configuration: CheckConfiguration) -> Self {
        Self { action: ChangeAction::Create, check_id: configuration.id.clone(), configuration: Some(configuration) }
    }

    pub fn updated(configuration: CheckConfiguration) -> Self {
        Self { action: ChangeAction::Update, check_id: configuration.id.clone(), configuration: Some(configuration) }
    }

    pub fn deleted(check_id: CheckId) -> Self {
        Self { action: ChangeAction::Delete, check_id, configuration: None }
    }
}

/// In-memory settings source
#[derive(Debug, Default)]
pub struct MemorySettings {
    configurations: RwLock<BTreeMap<CheckId, CheckConfiguration>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configurations(configurations: impl IntoIterator<Item = CheckConfiguration>) -> Self {
        let settings = Self::new();
        for configuration in configurations {
            settings.insert(configuration);
        }
        settings
    }

    /// Insert or replace a configuration, returning the previous one
    pub fn insert(&self, configuration: CheckConfiguration) -> Option<CheckConfiguration> {
        self.configurations.write().insert(configuration.id.clone(), configuration)
    }

    pub fn remove(&self, check_id: &CheckId) -> Option<CheckConfiguration> {
        self.configurations.write().remove(check_id)
    }

    pub fn len(&self) -> usize {
        self.configurations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.read().is_empty()
    }
}

#[async_trait]
impl SettingsSource for MemorySettings {
    async fn list_configurations(&self) -> Result<Vec<CheckConfiguration>> {
        Ok(self.configurations.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::CheckType;

    fn config(id: &str) -> CheckConfiguration {
        CheckConfiguration::new(id, CheckType::Dns, "example.com", Duration::from_secs(60), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_memory_settings_listing() {
        let settings = MemorySettings::with_configurations([config("b"), config("a")]);
        assert!(settings.insert(config("a")).is_some());
        assert!(settings.remove(&CheckId::from("missing")).is_none());

        let listed = settings.list_configurations().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_notification_constructors() {
        let created = ChangeNotification::created(config("web"));
        assert_eq!(created.action, ChangeAction::Create);
        assert_eq!(created.check_id.as_str(), "web");

        let deleted = ChangeNotification::deleted("web".into());
        assert_eq!(deleted.action, ChangeAction::Delete);
        assert!(deleted.configuration.is_none());
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_value(ChangeNotification::updated(config("web"))).unwrap();
        assert_eq!(json["action"], "UPDATE");
        assert_eq!(json["configuration"]["type"], "DNS");
        assert_eq!(json["configuration"]["frequency_ms"], 60000);
    }
}
