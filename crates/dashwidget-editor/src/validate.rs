//! Commit-time validation of a widget configuration.

use std::fmt;

use serde_json::Value;

use dashwidget_core::{AliasRegistry, DatasourceType, Schema, WidgetConfig};

/// One problem found in a working configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location within the config, e.g. `settings.units` or `datasources[1]`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validates settings against their schemas. An empty result means valid.
pub trait FormValidator: Send + Sync {
    fn validate(&self, config: &WidgetConfig, settings_schema: &Schema, data_key_schema: &Schema) -> Vec<ValidationIssue>;
}

/// Checks that every `required` property is present and not null.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaFormValidator;

impl FormValidator for SchemaFormValidator {
    fn validate(&self, config: &WidgetConfig, settings_schema: &Schema, data_key_schema: &Schema) -> Vec<ValidationIssue> {
        let mut issues = missing_required(settings_schema, &config.settings, "settings");

        if !data_key_schema.is_empty() {
            for (ds_index, ds) in config.datasources.iter().enumerate() {
                for (key_index, key) in ds.data_keys.iter().enumerate() {
                    let path = format!("datasources[{ds_index}].dataKeys[{key_index}].settings");
                    issues.extend(missing_required(data_key_schema, &key.settings, &path));
                }
            }
        }

        issues
    }
}

fn missing_required(schema: &Schema, settings: &Value, path: &str) -> Vec<ValidationIssue> {
    schema
        .required_properties()
        .into_iter()
        .filter(|name| settings.get(*name).map_or(true, Value::is_null))
        .map(|name| ValidationIssue::new(format!("{path}.{name}"), "required property is missing"))
        .collect()
}

/// Structural checks on datasource alias references.
///
/// Device datasources must reference an alias present in `aliases`;
/// function datasources must not reference one.
pub fn check_datasources(config: &WidgetConfig, aliases: &AliasRegistry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (index, ds) in config.datasources.iter().enumerate() {
        let path = format!("datasources[{index}]");
        match (ds.datasource_type, &ds.device_alias_id) {
            (DatasourceType::Device, None) => {
                issues.push(ValidationIssue::new(path, "device datasource has no alias"));
            }
            (DatasourceType::Device, Some(id)) if !aliases.contains(id) => {
                issues.push(ValidationIssue::new(path, format!("unknown device alias {id}")));
            }
            (DatasourceType::Function, Some(_)) => {
                issues.push(ValidationIssue::new(path, "function datasource must not reference an alias"));
            }
            _ => {}
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwidget_core::{
        AliasId, DataKey, DataKeyType, DatasourceEntry, DeviceAlias, DeviceFilter, JsonSchemaParser, SchemaParser,
    };
    use serde_json::json;

    fn schema(text: &str) -> Schema {
        JsonSchemaParser.parse(text).unwrap()
    }

    #[test]
    fn test_required_settings() {
        let settings_schema = schema(r#"{"schema": {"properties": {"units": {}}, "required": ["units", "title"]}}"#);
        let mut config = WidgetConfig::default();
        config.settings = json!({"units": "°C", "title": null});

        let issues = SchemaFormValidator.validate(&config, &settings_schema, &Schema::empty());
        assert_eq!(issues, vec![ValidationIssue::new("settings.title", "required property is missing")]);
    }

    #[test]
    fn test_top_level_required() {
        let settings_schema = schema(r#"{"required": ["units"]}"#);
        let mut config = WidgetConfig::default();
        config.settings = json!({"units": "kW"});

        assert!(SchemaFormValidator.validate(&config, &settings_schema, &Schema::empty()).is_empty());
    }

    #[test]
    fn test_required_data_key_settings() {
        let key_schema = schema(r#"{"schema": {"required": ["color"]}}"#);
        let mut ds = DatasourceEntry::device(AliasId::new("1"));
        ds.data_keys.push(DataKey::new("temperature", DataKeyType::Timeseries));
        let mut colored = DataKey::new("humidity", DataKeyType::Timeseries);
        colored.settings = json!({"color": "#ff0000"});
        ds.data_keys.push(colored);

        let mut config = WidgetConfig::default();
        config.datasources.push(ds);

        let issues = SchemaFormValidator.validate(&config, &Schema::empty(), &key_schema);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "datasources[0].dataKeys[0].settings.color");
    }

    #[test]
    fn test_alias_references() {
        let mut aliases = AliasRegistry::new();
        aliases
            .upsert(&DeviceAlias::new(AliasId::new("1"), "Thermostat", DeviceFilter::single("d1")))
            .unwrap();

        let mut function = DatasourceEntry::function("Random");
        function.device_alias_id = Some(AliasId::new("1"));

        let mut config = WidgetConfig::default();
        config.datasources = vec![
            DatasourceEntry::device(AliasId::new("1")),
            DatasourceEntry::empty(DatasourceType::Device),
            DatasourceEntry::device(AliasId::new("gone")),
            function,
            DatasourceEntry::function("Sine"),
        ];

        let paths: Vec<String> = check_datasources(&config, &aliases)
            .into_iter()
            .map(|issue| issue.to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "datasources[1]: device datasource has no alias".to_string(),
                "datasources[2]: unknown device alias gone".to_string(),
                "datasources[3]: function datasource must not reference an alias".to_string(),
            ]
        );
    }
}
