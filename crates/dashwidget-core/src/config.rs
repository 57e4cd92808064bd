//! Configuration storage abstraction.
//!
//! Dashboards, widgets and widget type descriptors are persisted as plain
//! JSON documents under string keys. Implementations decide where the
//! documents live (memory, files, a remote service).
//!
//! All methods are synchronous. Async wrappers can be added at the caller.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{DashboardConfig, Widget, WidgetTypeInfo};

const DASHBOARD_PREFIX: &str = "dashboard:";
const WIDGET_PREFIX: &str = "widget:";
const WIDGET_TYPE_PREFIX: &str = "widget-type:";

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration was not found.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// Failed to write configuration.
    #[error("Write error: {0}")]
    WriteError(String),

    /// Stored configuration data is invalid.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Storage is not available.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Abstract configuration storage.
pub trait ConfigStorage: Send + Sync {
    // ========================================================================
    // Generic Key-Value
    // ========================================================================

    /// Load a value by key.
    fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError>;

    /// Save a value by key.
    fn save_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError>;

    /// Check if a key exists.
    fn has_key(&self, key: &str) -> bool;

    /// Delete a key.
    fn delete_key(&self, key: &str) -> Result<(), ConfigError>;

    /// List stored keys starting with `prefix`, with the prefix stripped.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ConfigError>;

    // ========================================================================
    // Dashboards
    // ========================================================================

    fn load_dashboard(&self, dashboard_id: &str) -> Result<DashboardConfig, ConfigError> {
        self.load_value(&format!("{DASHBOARD_PREFIX}{dashboard_id}"))
    }

    fn save_dashboard(&self, dashboard_id: &str, config: &DashboardConfig) -> Result<(), ConfigError> {
        self.save_value(&format!("{DASHBOARD_PREFIX}{dashboard_id}"), config)
    }

    fn list_dashboards(&self) -> Result<Vec<String>, ConfigError> {
        self.list_keys(DASHBOARD_PREFIX)
    }

    // ========================================================================
    // Widgets
    // ========================================================================

    fn load_widget(&self, dashboard_id: &str, widget_id: &str) -> Result<Widget, ConfigError> {
        self.load_value(&format!("{WIDGET_PREFIX}{dashboard_id}:{widget_id}"))
    }

    fn save_widget(&self, dashboard_id: &str, widget_id: &str, widget: &Widget) -> Result<(), ConfigError> {
        self.save_value(&format!("{WIDGET_PREFIX}{dashboard_id}:{widget_id}"), widget)
    }

    // ========================================================================
    // Widget Types
    // ========================================================================

    fn load_widget_type(&self, type_key: &str) -> Result<WidgetTypeInfo, ConfigError> {
        self.load_value(&format!("{WIDGET_TYPE_PREFIX}{type_key}"))
    }

    fn save_widget_type(&self, type_key: &str, info: &WidgetTypeInfo) -> Result<(), ConfigError> {
        self.save_value(&format!("{WIDGET_TYPE_PREFIX}{type_key}"), info)
    }
}

/// In-memory storage holding JSON text per key.
#[derive(Debug, Default)]
pub struct MemoryConfigStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E>(_: E) -> ConfigError {
    ConfigError::StorageUnavailable("storage lock poisoned".to_string())
}

impl ConfigStorage for MemoryConfigStorage {
    fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let data = self.data.read().map_err(poisoned)?;
        let json = data
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    fn save_value<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let json = serde_json::to_string(value).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        self.data.write().map_err(poisoned)?.insert(key.to_string(), json);
        Ok(())
    }

    fn has_key(&self, key: &str) -> bool {
        self.data
            .read()
            .map(|data| data.contains_key(key))
            .unwrap_or(false)
    }

    fn delete_key(&self, key: &str) -> Result<(), ConfigError> {
        self.data.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ConfigError> {
        let data = self.data.read().map_err(poisoned)?;
        let mut keys: Vec<String> = data
            .keys()
            .filter_map(|k| k.strip_prefix(prefix).map(String::from))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AliasId, DatasourceEntry, WidgetType};
    use crate::registry::{DeviceAlias, DeviceFilter};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dashboard_round_trip() {
        let storage = MemoryConfigStorage::new();

        let mut config = DashboardConfig::default();
        config
            .device_aliases
            .upsert(&DeviceAlias::new(
                AliasId::new("1"),
                "Thermostat",
                DeviceFilter::single("d1"),
            ))
            .unwrap();

        storage.save_dashboard("main", &config).unwrap();
        let loaded = storage.load_dashboard("main").unwrap();

        assert_eq!(loaded, config);
        assert_eq!(storage.list_dashboards().unwrap(), vec!["main".to_string()]);
    }

    #[test]
    fn test_widget_round_trip() {
        let storage = MemoryConfigStorage::new();

        let mut widget = Widget::new(WidgetType::Timeseries);
        widget
            .config
            .datasources
            .push(DatasourceEntry::device(AliasId::new("1")));

        storage.save_widget("main", "w1", &widget).unwrap();
        assert_eq!(storage.load_widget("main", "w1").unwrap(), widget);
    }

    #[test]
    fn test_missing_key() {
        let storage = MemoryConfigStorage::new();

        assert!(!storage.has_key("widget-type:cards.gauge"));
        assert!(matches!(
            storage.load_widget_type("cards.gauge"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_data() {
        let storage = MemoryConfigStorage::new();
        storage.save_value("dashboard:broken", &vec![1, 2, 3]).unwrap();

        assert!(matches!(
            storage.load_dashboard("broken"),
            Err(ConfigError::InvalidData(_))
        ));

        storage.delete_key("dashboard:broken").unwrap();
        assert!(!storage.has_key("dashboard:broken"));
    }
}
