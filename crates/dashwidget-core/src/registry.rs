//! Dashboard device alias registry.
//!
//! The registry maps alias ids to a device filter. It is owned by the
//! dashboard configuration; datasources only hold alias ids. Resolving the
//! filters to concrete devices is done externally and produces an
//! [`AliasesInfo`] snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::AliasId;

/// Selects the device(s) an alias stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFilter {
    /// A single device picked directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Whether `device_name_filter` is used instead of `device_list`
    #[serde(default)]
    pub use_filter: bool,

    /// Device name prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name_filter: Option<String>,

    /// Explicit device ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_list: Vec<String>,

    /// Fields not interpreted here
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceFilter {
    /// Filter matching exactly one device.
    pub fn single(device_id: &str) -> Self {
        Self {
            device_id: Some(device_id.to_string()),
            ..Default::default()
        }
    }

    /// Filter matching devices whose name starts with `prefix`.
    pub fn name_prefix(prefix: &str) -> Self {
        Self {
            use_filter: true,
            device_name_filter: Some(prefix.to_string()),
            ..Default::default()
        }
    }
}

/// Registry value stored under an alias id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasEntry {
    pub alias: String,
    #[serde(default)]
    pub device_filter: DeviceFilter,

    /// Fields not interpreted here (description, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A device alias together with its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAlias {
    pub id: AliasId,
    pub alias: String,
    pub device_filter: DeviceFilter,
}

impl DeviceAlias {
    pub fn new(id: AliasId, alias: &str, device_filter: DeviceFilter) -> Self {
        Self {
            id,
            alias: alias.to_string(),
            device_filter,
        }
    }

    fn entry(&self) -> AliasEntry {
        AliasEntry {
            alias: self.alias.clone(),
            device_filter: self.device_filter.clone(),
            extra: Map::new(),
        }
    }
}

/// Errors raised when writing to the registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Alias name must not be empty")]
    EmptyAliasName,

    #[error("Alias name '{alias}' is already used by alias {existing}")]
    DuplicateAliasName { alias: String, existing: AliasId },
}

/// Dashboard-wide mapping of alias id to alias entry.
///
/// Serialized as a plain JSON object keyed by alias id. Entries are kept
/// ordered by id so snapshots compare and serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasRegistry {
    aliases: BTreeMap<AliasId, AliasEntry>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AliasId) -> Option<&AliasEntry> {
        self.aliases.get(id)
    }

    pub fn contains(&self, id: &AliasId) -> bool {
        self.aliases.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AliasId, &AliasEntry)> {
        self.aliases.iter()
    }

    /// Find an alias by its display name.
    pub fn find_by_name(&self, alias: &str) -> Option<(&AliasId, &AliasEntry)> {
        self.aliases.iter().find(|(_, entry)| entry.alias == alias)
    }

    /// Insert or replace a single alias.
    ///
    /// Alias names are unique: a name already held by another id is rejected
    /// and the registry is left unchanged. Replacing an entry keeps its
    /// uninterpreted fields. Returns the replaced entry, if any.
    pub fn upsert(&mut self, alias: &DeviceAlias) -> Result<Option<AliasEntry>, RegistryError> {
        if alias.alias.trim().is_empty() {
            return Err(RegistryError::EmptyAliasName);
        }
        if let Some((existing, _)) = self.find_by_name(&alias.alias) {
            if *existing != alias.id {
                return Err(RegistryError::DuplicateAliasName {
                    alias: alias.alias.clone(),
                    existing: existing.clone(),
                });
            }
        }

        let mut entry = alias.entry();
        if let Some(previous) = self.aliases.get(&alias.id) {
            entry.extra = previous.extra.clone();
        }
        Ok(self.aliases.insert(alias.id.clone(), entry))
    }

    /// Remove an alias by id.
    pub fn remove(&mut self, id: &AliasId) -> Option<AliasEntry> {
        self.aliases.remove(id)
    }

    /// Ids from `ids` that are not registered, without duplicates.
    pub fn missing<'a>(&self, ids: impl IntoIterator<Item = &'a AliasId>) -> Vec<AliasId> {
        let mut missing: Vec<AliasId> = Vec::new();
        for id in ids {
            if !self.contains(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        missing
    }
}

/// Resolved metadata for one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAlias {
    pub alias: String,

    /// Device the alias currently resolves to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Read-only snapshot of resolved aliases.
///
/// Always produced by an alias resolver from the whole registry, never
/// edited by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasesInfo {
    #[serde(default)]
    pub device_aliases: BTreeMap<AliasId, ResolvedAlias>,
}

impl AliasesInfo {
    pub fn get(&self, id: &AliasId) -> Option<&ResolvedAlias> {
        self.device_aliases.get(id)
    }

    /// Device behind an alias, if the alias is known and bound to a device.
    pub fn device_id(&self, id: &AliasId) -> Option<&str> {
        self.device_aliases.get(id)?.device_id.as_deref()
    }
}

/// Result of resolving a registry.
///
/// When `error` is set the snapshot must not replace one the caller already
/// holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResolution {
    #[serde(default)]
    pub aliases_info: AliasesInfo,

    #[serde(default)]
    pub error: bool,
}

impl AliasResolution {
    pub fn ok(aliases_info: AliasesInfo) -> Self {
        Self {
            aliases_info,
            error: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            aliases_info: AliasesInfo::default(),
            error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn alias(id: &str, name: &str, device: &str) -> DeviceAlias {
        DeviceAlias::new(AliasId::new(id), name, DeviceFilter::single(device))
    }

    #[test]
    fn test_registry_deserialize() {
        let json = r#"{
            "1": {"alias": "Thermostat", "deviceFilter": {"deviceId": "d1"}},
            "2": {"alias": "Meters", "deviceFilter": {"useFilter": true, "deviceNameFilter": "Meter"}}
        }"#;

        let registry: AliasRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(registry.len(), 2);

        let meters = registry.get(&AliasId::new("2")).unwrap();
        assert!(meters.device_filter.use_filter);
        assert_eq!(meters.device_filter.device_name_filter.as_deref(), Some("Meter"));
    }

    #[test]
    fn test_entry_keeps_unknown_fields() {
        let json = serde_json::json!({
            "alias": "A",
            "deviceFilter": {"deviceId": "d1", "useFilter": false, "stateEntity": true},
            "description": "x"
        });

        let entry: AliasEntry = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(entry.extra["description"], "x");
        assert_eq!(entry.device_filter.extra["stateEntity"], true);
        assert_eq!(serde_json::to_value(&entry).unwrap(), json);
    }

    #[test]
    fn test_upsert_keeps_unknown_fields_of_replaced_entry() {
        let mut registry: AliasRegistry = serde_json::from_value(serde_json::json!({
            "1": {"alias": "Thermostat", "deviceFilter": {"deviceId": "d1"}, "description": "hall"}
        }))
        .unwrap();

        registry.upsert(&alias("1", "Thermostat", "d2")).unwrap();

        let entry = registry.get(&AliasId::new("1")).unwrap();
        assert_eq!(entry.device_filter.device_id.as_deref(), Some("d2"));
        assert_eq!(entry.extra["description"], "hall");
    }

    #[test]
    fn test_upsert_inserts_and_replaces() {
        let mut registry = AliasRegistry::new();

        assert_eq!(registry.upsert(&alias("1", "Sensor A", "d1")).unwrap(), None);

        let replaced = registry.upsert(&alias("1", "Sensor A", "d2")).unwrap();
        assert_eq!(
            replaced.map(|e| e.device_filter.device_id),
            Some(Some("d1".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_rejects_duplicate_name() {
        let mut registry = AliasRegistry::new();
        registry.upsert(&alias("1", "Sensor A", "d1")).unwrap();
        let before = registry.clone();

        let err = registry.upsert(&alias("2", "Sensor A", "d2")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateAliasName {
                alias: "Sensor A".to_string(),
                existing: AliasId::new("1"),
            }
        );
        assert_eq!(registry, before);
    }

    #[test]
    fn test_upsert_rejects_blank_name() {
        let mut registry = AliasRegistry::new();
        assert_eq!(
            registry.upsert(&alias("1", "  ", "d1")),
            Err(RegistryError::EmptyAliasName)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_ids() {
        let mut registry = AliasRegistry::new();
        registry.upsert(&alias("1", "Sensor A", "d1")).unwrap();

        let ids = [AliasId::new("1"), AliasId::new("9"), AliasId::new("9")];
        assert_eq!(registry.missing(ids.iter()), vec![AliasId::new("9")]);
    }

    #[test]
    fn test_aliases_info_device_lookup() {
        let mut info = AliasesInfo::default();
        info.device_aliases.insert(
            AliasId::new("1"),
            ResolvedAlias {
                alias: "Sensor A".to_string(),
                device_id: Some("d1".to_string()),
            },
        );
        info.device_aliases.insert(
            AliasId::new("2"),
            ResolvedAlias {
                alias: "Nothing".to_string(),
                device_id: None,
            },
        );

        assert_eq!(info.device_id(&AliasId::new("1")), Some("d1"));
        assert_eq!(info.device_id(&AliasId::new("2")), None);
        assert_eq!(info.device_id(&AliasId::new("3")), None);
    }

    #[test]
    fn test_resolution_error_flag() {
        let resolution: AliasResolution = serde_json::from_str(r#"{"error": true}"#).unwrap();
        assert!(resolution.error);
        assert!(resolution.aliases_info.device_aliases.is_empty());
    }
}
