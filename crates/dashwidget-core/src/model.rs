//! Widget configuration model types.
//!
//! These types mirror the persisted dashboard layout:
//! - Datasource entries and their ordered data keys
//! - Widget configuration and widget type descriptors
//! - Dashboard configuration holding the device alias registry
//!
//! All types serialize to plain camelCase JSON. Fields this crate does not
//! interpret are kept in `extra` maps so they survive a load/save cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::AliasRegistry;

/// Identifier of a device alias, unique within one dashboard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasId(String);

impl AliasId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AliasId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AliasId {
    fn from(s: &str) -> Self {
        AliasId::new(s)
    }
}

impl From<String> for AliasId {
    fn from(s: String) -> Self {
        AliasId(s)
    }
}

/// Where a datasource takes its values from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceType {
    /// Telemetry or attributes of the device behind a device alias.
    #[default]
    Device,
    /// Synthetic series produced by a key function.
    Function,
}

const ALL_DATASOURCE_TYPES: &[DatasourceType] = &[DatasourceType::Device, DatasourceType::Function];
const FUNCTION_DATASOURCE_TYPES: &[DatasourceType] = &[DatasourceType::Function];

/// Datasource types a user may pick from.
///
/// Widgets restricted to functions only offer `Function`.
pub fn available_datasource_types(functions_only: bool) -> &'static [DatasourceType] {
    if functions_only {
        FUNCTION_DATASOURCE_TYPES
    } else {
        ALL_DATASOURCE_TYPES
    }
}

/// Kind of value a data key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKeyType {
    Timeseries,
    Attribute,
    Function,
}

/// A single key shown by a widget (one series, one table column, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataKey {
    /// Key name as known by the device (or the function name)
    pub name: String,

    /// Display label
    #[serde(default)]
    pub label: String,

    /// Kind of key
    #[serde(rename = "type")]
    pub key_type: DataKeyType,

    /// Settings bag validated against the data key settings schema
    #[serde(default = "empty_object")]
    pub settings: Value,

    /// Fields not interpreted here (color, funcBody, units, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataKey {
    /// Create a key labelled with its own name and empty settings.
    pub fn new(name: &str, key_type: DataKeyType) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            key_type,
            settings: empty_object(),
            extra: Map::new(),
        }
    }
}

/// One datasource of a widget.
///
/// `device_alias_id` is only meaningful for `Device` entries. A device entry
/// may lack an alias while it is being edited, but must carry a registered
/// one when the widget is committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceEntry {
    #[serde(rename = "type", default)]
    pub datasource_type: DatasourceType,

    /// Display name, mostly used by function datasources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_alias_id: Option<AliasId>,

    /// Ordered keys; order is the display/series order
    #[serde(default)]
    pub data_keys: Vec<DataKey>,

    /// Fields not interpreted here (entityAliasId, intervalSec, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasourceEntry {
    /// Create a device datasource bound to the given alias.
    pub fn device(alias_id: AliasId) -> Self {
        Self {
            datasource_type: DatasourceType::Device,
            device_alias_id: Some(alias_id),
            ..Default::default()
        }
    }

    /// Create an empty function datasource.
    pub fn function(name: &str) -> Self {
        Self {
            datasource_type: DatasourceType::Function,
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Create an empty datasource of the given type.
    pub fn empty(datasource_type: DatasourceType) -> Self {
        Self {
            datasource_type,
            ..Default::default()
        }
    }

    pub fn is_device_bound(&self) -> bool {
        self.datasource_type == DatasourceType::Device
    }
}

/// Widget category, used for help topics and type-specific behavior.
///
/// Type strings this crate does not know are kept verbatim in `Other` and
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WidgetType {
    Timeseries,
    Latest,
    Rpc,
    Static,
    Other(String),
}

impl WidgetType {
    fn known(name: &str) -> Option<Self> {
        match name {
            "timeseries" => Some(WidgetType::Timeseries),
            "latest" => Some(WidgetType::Latest),
            "rpc" => Some(WidgetType::Rpc),
            "static" => Some(WidgetType::Static),
            _ => None,
        }
    }

    /// The type string as stored.
    pub fn as_str(&self) -> &str {
        match self {
            WidgetType::Timeseries => "timeseries",
            WidgetType::Latest => "latest",
            WidgetType::Rpc => "rpc",
            WidgetType::Static => "static",
            WidgetType::Other(name) => name,
        }
    }
}

impl std::fmt::Display for WidgetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for WidgetType {
    fn from(name: &str) -> Self {
        WidgetType::known(name).unwrap_or_else(|| WidgetType::Other(name.to_string()))
    }
}

impl From<String> for WidgetType {
    fn from(name: String) -> Self {
        WidgetType::known(&name).unwrap_or(WidgetType::Other(name))
    }
}

impl From<WidgetType> for String {
    fn from(widget_type: WidgetType) -> Self {
        match widget_type {
            WidgetType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Configuration of a single widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    #[serde(default)]
    pub datasources: Vec<DatasourceEntry>,

    /// Widget settings validated against the settings schema
    #[serde(default = "empty_object")]
    pub settings: Value,

    /// Fields not interpreted here (title, timewindow, showLegend, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            datasources: Vec::new(),
            settings: empty_object(),
            extra: Map::new(),
        }
    }
}

impl WidgetConfig {
    /// Alias ids referenced by device datasources, in datasource order.
    pub fn referenced_alias_ids(&self) -> impl Iterator<Item = &AliasId> {
        self.datasources
            .iter()
            .filter(|ds| ds.is_device_bound())
            .filter_map(|ds| ds.device_alias_id.as_ref())
    }
}

/// A widget placed on a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<WidgetType>,

    #[serde(default)]
    pub config: WidgetConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Widget {
    pub fn new(widget_type: WidgetType) -> Self {
        Self {
            id: None,
            widget_type: Some(widget_type),
            config: WidgetConfig::default(),
            extra: Map::new(),
        }
    }
}

/// Descriptor of a widget type as stored in the widget library.
///
/// Schemas are kept as JSON text. The `type_*` variants override the
/// generic ones when present and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTypeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_settings_schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_data_key_settings_schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key_settings_schema: Option<String>,
}

impl WidgetTypeInfo {
    /// Settings schema text in effect for this widget type.
    pub fn effective_settings_schema(&self) -> Option<&str> {
        first_non_empty(&self.type_settings_schema, &self.settings_schema)
    }

    /// Data key settings schema text in effect for this widget type.
    pub fn effective_data_key_settings_schema(&self) -> Option<&str> {
        first_non_empty(
            &self.type_data_key_settings_schema,
            &self.data_key_settings_schema,
        )
    }
}

fn first_non_empty<'a>(preferred: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    preferred
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(fallback.as_deref())
}

/// Dashboard-wide configuration relevant to widget editing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[serde(default)]
    pub device_aliases: AliasRegistry,

    /// Fields not interpreted here (widgets, gridSettings, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_datasource_defaults_when_fields_missing() {
        let entry: DatasourceEntry = serde_json::from_str("{}").unwrap();
        assert_eq!(entry.datasource_type, DatasourceType::Device);
        assert!(entry.device_alias_id.is_none());
        assert!(entry.data_keys.is_empty());
    }

    #[test]
    fn test_datasource_deserialize() {
        let json = r##"{
            "type": "device",
            "deviceAliasId": "1",
            "dataKeys": [
                {"name": "temperature", "label": "Temp", "type": "timeseries", "color": "#2196f3"},
                {"name": "active", "type": "attribute", "settings": {"decimals": 2}}
            ]
        }"##;

        let entry: DatasourceEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.device_alias_id, Some(AliasId::new("1")));
        assert_eq!(entry.data_keys.len(), 2);
        assert_eq!(entry.data_keys[0].label, "Temp");
        assert_eq!(entry.data_keys[0].extra["color"], "#2196f3");
        assert_eq!(entry.data_keys[1].key_type, DataKeyType::Attribute);
        assert_eq!(entry.data_keys[1].settings["decimals"], 2);
    }

    #[test]
    fn test_function_datasource_serialize_omits_alias() {
        let mut entry = DatasourceEntry::function("Random");
        entry.data_keys.push(DataKey::new("Sin", DataKeyType::Function));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "Random");
        assert!(json.get("deviceAliasId").is_none());
        assert_eq!(json["dataKeys"][0]["label"], "Sin");
        assert_eq!(json["dataKeys"][0]["settings"], serde_json::json!({}));
    }

    #[test]
    fn test_available_datasource_types() {
        assert_eq!(available_datasource_types(true), &[DatasourceType::Function]);
        assert_eq!(
            available_datasource_types(false),
            &[DatasourceType::Device, DatasourceType::Function]
        );
    }

    #[test]
    fn test_widget_config_keeps_unknown_fields() {
        let json = r#"{
            "datasources": [],
            "title": "Temperature",
            "timewindow": {"realtime": {"timewindowMs": 60000}}
        }"#;

        let config: WidgetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.settings, serde_json::json!({}));
        assert_eq!(config.extra["title"], "Temperature");

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["timewindow"]["realtime"]["timewindowMs"], 60000);
    }

    #[test]
    fn test_unknown_widget_type_is_kept() {
        let widget: Widget = serde_json::from_str(r#"{"type": "alarm"}"#).unwrap();
        assert_eq!(widget.widget_type, Some(WidgetType::Other("alarm".to_string())));
        assert!(widget.config.datasources.is_empty());

        let back = serde_json::to_value(&widget).unwrap();
        assert_eq!(back["type"], "alarm");
    }

    #[test]
    fn test_known_widget_type_round_trip() {
        let widget: Widget = serde_json::from_str(r#"{"type": "rpc"}"#).unwrap();
        assert_eq!(widget.widget_type, Some(WidgetType::Rpc));
        assert_eq!(serde_json::to_value(&widget).unwrap()["type"], "rpc");
        assert_eq!(WidgetType::from("static"), WidgetType::Static);
        assert_eq!(WidgetType::from("alarm").as_str(), "alarm");
    }

    #[test]
    fn test_datasource_keeps_unknown_fields() {
        let json = serde_json::json!({
            "type": "function",
            "name": "f",
            "dataKeys": [],
            "entityAliasId": "x"
        });

        let entry: DatasourceEntry = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(entry.extra["entityAliasId"], "x");
        assert_eq!(serde_json::to_value(&entry).unwrap(), json);
    }

    #[test]
    fn test_referenced_alias_ids_skip_function_entries() {
        let mut config = WidgetConfig::default();
        config.datasources.push(DatasourceEntry::device(AliasId::new("a")));
        config.datasources.push(DatasourceEntry::function("f"));
        config.datasources.push(DatasourceEntry::empty(DatasourceType::Device));

        let ids: Vec<&AliasId> = config.referenced_alias_ids().collect();
        assert_eq!(ids, vec![&AliasId::new("a")]);
    }

    #[test]
    fn test_effective_schema_falls_back_on_empty_type_schema() {
        let info = WidgetTypeInfo {
            type_settings_schema: Some(String::new()),
            settings_schema: Some(r#"{"schema": {}}"#.to_string()),
            type_data_key_settings_schema: Some(r#"{"a": 1}"#.to_string()),
            data_key_settings_schema: Some(r#"{"b": 2}"#.to_string()),
        };

        assert_eq!(info.effective_settings_schema(), Some(r#"{"schema": {}}"#));
        assert_eq!(info.effective_data_key_settings_schema(), Some(r#"{"a": 1}"#));
        assert_eq!(WidgetTypeInfo::default().effective_settings_schema(), None);
    }
}
