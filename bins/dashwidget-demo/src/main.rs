use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashwidget_core::{
    ConfigStorage, DashboardConfig, DataKeyType, DeviceFilter, MemoryConfigStorage, Widget, WidgetTypeInfo,
};
use dashwidget_editor::{
    AliasDraft, AliasOutcome, AliasResolver, DeviceRecord, EditOutcome, EditorServices, InMemoryDeviceRegistry,
    ScriptedDialogHost, WidgetEditSession,
};

const DEFAULT_FIXTURE: &str = "fixtures/demo.json";
const DASHBOARD_ID: &str = "demo";
const WIDGET_TYPE_KEY: &str = "demo.timeseries";

/// Everything the demo needs to run one edit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemoFixture {
    dashboard: DashboardConfig,
    widget: Widget,
    widget_type: WidgetTypeInfo,
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dashwidget_editor=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let fixture_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE));
    tracing::info!("Loading fixture {}", fixture_path.display());

    let text = std::fs::read_to_string(&fixture_path)
        .with_context(|| format!("reading fixture {}", fixture_path.display()))?;
    let fixture: DemoFixture = serde_json::from_str(&text).context("parsing fixture")?;

    // Seed storage
    let storage = MemoryConfigStorage::new();
    let widget_id = fixture.widget.id.clone().unwrap_or_else(|| "widget".to_string());
    storage.save_dashboard(DASHBOARD_ID, &fixture.dashboard)?;
    storage.save_widget(DASHBOARD_ID, &widget_id, &fixture.widget)?;
    storage.save_widget_type(WIDGET_TYPE_KEY, &fixture.widget_type)?;

    let registry = Arc::new(InMemoryDeviceRegistry::new(fixture.devices));
    let dashboard = Arc::new(RwLock::new(storage.load_dashboard(DASHBOARD_ID)?));
    let resolution = registry.resolve(&dashboard.read().await.device_aliases).await?;
    if resolution.error {
        tracing::warn!("Some dashboard aliases match no device");
    }

    let mut session = WidgetEditSession::open(
        storage.load_widget(DASHBOARD_ID, &widget_id)?,
        &storage.load_widget_type(WIDGET_TYPE_KEY)?,
        dashboard.clone(),
        resolution.aliases_info,
        EditorServices::new(registry.clone(), registry.clone()),
    )?;
    tracing::info!("Help topic: {}", session.help_topic());

    // Scripted user: add a datasource, create an alias for it in the dialog,
    // then pick every timeseries key of the aliased device.
    let slot = session.add_datasource()?;
    let host = ScriptedDialogHost::new([Ok(
        AliasDraft::named("Boiler sensors").with_filter(DeviceFilter::name_prefix("boiler"))
    )]);

    match session.create_device_alias(&host, "Boiler sensors", Some(slot)).await? {
        AliasOutcome::Created(alias) => tracing::info!("Created alias {} ({})", alias.alias, alias.id),
        AliasOutcome::Cancelled => tracing::warn!("Alias dialog dismissed"),
    }

    let keys = session.lookup_keys(slot, "", DataKeyType::Timeseries)?.await.into_keys();
    let model = session.datasource(slot)?;
    for key in &keys {
        model.add_data_key(session.generate_data_key(&key.name, key.key_type))?;
    }
    tracing::info!("Added {} data keys", keys.len());

    match session.confirm().await? {
        EditOutcome::Committed { widget, aliases_info } => {
            storage.save_widget(DASHBOARD_ID, &widget_id, &widget)?;
            storage.save_dashboard(DASHBOARD_ID, &*dashboard.read().await)?;

            println!("{}", serde_json::to_string_pretty(&widget)?);
            println!("{}", serde_json::to_string_pretty(&aliases_info)?);
        }
        EditOutcome::Dismissed { .. } => tracing::warn!("Edit was dismissed"),
    }

    Ok(())
}
