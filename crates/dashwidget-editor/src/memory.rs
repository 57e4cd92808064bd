//! In-memory device registry.
//!
//! Serves both lookups the editor needs: device keys and alias resolution.
//! Used by the demo binary and by tests in place of a remote device service.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use dashwidget_core::{AliasRegistry, AliasResolution, AliasesInfo, DataKeyType, DeviceFilter, ResolvedAlias};

use crate::resolver::{AliasResolver, DeviceKeyResolver, KeyDescriptor, LookupError};

/// A device and the keys it reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub timeseries: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl DeviceRecord {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            timeseries: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_timeseries(mut self, keys: &[&str]) -> Self {
        self.timeseries.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn with_attributes(mut self, keys: &[&str]) -> Self {
        self.attributes.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    fn keys(&self, key_type: DataKeyType) -> &[String] {
        match key_type {
            DataKeyType::Timeseries => self.timeseries.as_slice(),
            DataKeyType::Attribute => self.attributes.as_slice(),
            DataKeyType::Function => &[],
        }
    }
}

/// Device registry held in memory.
#[derive(Debug)]
pub struct InMemoryDeviceRegistry {
    devices: Vec<DeviceRecord>,
    available: AtomicBool,
}

impl InMemoryDeviceRegistry {
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        Self {
            devices,
            available: AtomicBool::new(true),
        }
    }

    pub fn with_device(mut self, device: DeviceRecord) -> Self {
        self.devices.push(device);
        self
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    /// Simulate the backing service going away. Every lookup fails with
    /// [`LookupError::Unavailable`] until it is made available again.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn device(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == device_id)
    }

    fn check_available(&self) -> Result<(), LookupError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(LookupError::Unavailable("device registry offline".to_string()))
        }
    }

    /// First device matched by `filter`.
    ///
    /// An explicit device id wins, then the device list in order, then a
    /// case-insensitive name prefix when filtering is enabled.
    pub fn resolve_filter(&self, filter: &DeviceFilter) -> Option<&DeviceRecord> {
        if let Some(device) = filter.device_id.as_deref().and_then(|id| self.device(id)) {
            return Some(device);
        }

        if let Some(device) = filter.device_list.iter().find_map(|id| self.device(id)) {
            return Some(device);
        }

        let prefix = filter.device_name_filter.as_deref().filter(|_| filter.use_filter)?;
        let prefix = prefix.to_lowercase();
        self.devices
            .iter()
            .find(|d| d.name.to_lowercase().starts_with(&prefix))
    }

    /// Resolve every alias in `aliases`. The result is flagged as an error
    /// when any alias matches no device.
    pub fn resolve_registry(&self, aliases: &AliasRegistry) -> AliasResolution {
        let mut info = AliasesInfo::default();
        let mut error = false;

        for (id, entry) in aliases.iter() {
            let device_id = self.resolve_filter(&entry.device_filter).map(|d| d.id.clone());
            error |= device_id.is_none();
            info.device_aliases.insert(
                id.clone(),
                ResolvedAlias {
                    alias: entry.alias.clone(),
                    device_id,
                },
            );
        }

        AliasResolution { aliases_info: info, error }
    }

    fn matching_keys(&self, device_id: &str, query: &str, key_type: DataKeyType) -> Result<Vec<KeyDescriptor>, LookupError> {
        self.check_available()?;
        let device = self
            .device(device_id)
            .ok_or_else(|| LookupError::DeviceNotFound(device_id.to_string()))?;

        let query = query.to_lowercase();
        Ok(device
            .keys(key_type)
            .iter()
            .filter(|name| name.to_lowercase().starts_with(&query))
            .map(|name| KeyDescriptor::new(name, key_type))
            .collect())
    }
}

impl Default for InMemoryDeviceRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DeviceKeyResolver for InMemoryDeviceRegistry {
    fn get_keys<'a>(
        &'a self,
        device_id: &'a str,
        query: &'a str,
        key_type: DataKeyType,
    ) -> BoxFuture<'a, Result<Vec<KeyDescriptor>, LookupError>> {
        async move { self.matching_keys(device_id, query, key_type) }.boxed()
    }
}

impl AliasResolver for InMemoryDeviceRegistry {
    fn resolve<'a>(&'a self, aliases: &'a AliasRegistry) -> BoxFuture<'a, Result<AliasResolution, LookupError>> {
        async move {
            self.check_available()?;
            Ok(self.resolve_registry(aliases))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwidget_core::{AliasId, DeviceAlias};

    fn registry() -> InMemoryDeviceRegistry {
        InMemoryDeviceRegistry::default()
            .with_device(
                DeviceRecord::new("d1", "Boiler Room Sensor")
                    .with_timeseries(&["temperature", "Humidity", "pressure"])
                    .with_attributes(&["firmware"]),
            )
            .with_device(DeviceRecord::new("d2", "Meter 7").with_timeseries(&["energy"]))
    }

    #[test]
    fn test_filter_precedence() {
        let registry = registry();

        assert_eq!(registry.resolve_filter(&DeviceFilter::single("d2")).map(|d| d.id.as_str()), Some("d2"));

        let listed = DeviceFilter {
            device_list: vec!["missing".to_string(), "d1".to_string()],
            ..DeviceFilter::default()
        };
        assert_eq!(registry.resolve_filter(&listed).map(|d| d.id.as_str()), Some("d1"));

        assert_eq!(
            registry.resolve_filter(&DeviceFilter::name_prefix("meter")).map(|d| d.id.as_str()),
            Some("d2")
        );

        let disabled = DeviceFilter {
            use_filter: false,
            device_name_filter: Some("Meter".to_string()),
            ..DeviceFilter::default()
        };
        assert!(registry.resolve_filter(&disabled).is_none());
    }

    #[test]
    fn test_resolve_registry_flags_unmatched() {
        let registry = registry();
        let mut aliases = AliasRegistry::new();
        aliases
            .upsert(&DeviceAlias::new(AliasId::new("1"), "Boiler", DeviceFilter::single("d1")))
            .unwrap();

        let resolution = registry.resolve_registry(&aliases);
        assert!(!resolution.error);
        assert_eq!(resolution.aliases_info.device_id(&AliasId::new("1")), Some("d1"));

        aliases
            .upsert(&DeviceAlias::new(AliasId::new("2"), "Ghost", DeviceFilter::single("d404")))
            .unwrap();
        let resolution = registry.resolve_registry(&aliases);
        assert!(resolution.error);
        assert_eq!(resolution.aliases_info.device_id(&AliasId::new("2")), None);
    }

    #[tokio::test]
    async fn test_key_query_is_case_insensitive_prefix() {
        let registry = registry();

        let keys = registry.get_keys("d1", "h", DataKeyType::Timeseries).await.unwrap();
        assert_eq!(keys, vec![KeyDescriptor::new("Humidity", DataKeyType::Timeseries)]);

        let keys = registry.get_keys("d1", "", DataKeyType::Attribute).await.unwrap();
        assert_eq!(keys, vec![KeyDescriptor::new("firmware", DataKeyType::Attribute)]);

        let keys = registry.get_keys("d1", "", DataKeyType::Function).await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let registry = registry();

        assert_eq!(
            registry.get_keys("d9", "", DataKeyType::Timeseries).await,
            Err(LookupError::DeviceNotFound("d9".to_string()))
        );

        registry.set_available(false);
        assert!(matches!(
            registry.get_keys("d1", "", DataKeyType::Timeseries).await,
            Err(LookupError::Unavailable(_))
        ));
        assert!(registry.resolve(&AliasRegistry::new()).await.is_err());
    }
}
