//! Transactional widget edit.
//!
//! A [`WidgetEditSession`] edits a working copy of one widget's config. The
//! widget itself is only replaced on [`WidgetEditSession::confirm`];
//! [`WidgetEditSession::cancel`] leaves it untouched. The dashboard alias
//! registry is shared with the opener and is only written by a confirmed
//! alias creation.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use dashwidget_core::{
    AliasId, AliasesInfo, DashboardConfig, DataKey, DataKeyType, DatasourceEntry, DatasourceType, DeviceAlias,
    HelpTopics, JsonSchemaParser, Schema, SchemaError, SchemaParser, Widget, WidgetConfig, WidgetType, WidgetTypeInfo,
    WIDGET_HELP_TOPICS,
};

use crate::datasource::{DatasourceError, DatasourceModel, KeyLookup};
use crate::dialog::{AliasDialogHost, AliasDialogLocals, AliasDraft, Dismissed};
use crate::resolver::{fetch_keys_for_alias, AliasResolver, DeviceKeyResolver, KeyDescriptor};
use crate::validate::{check_datasources, FormValidator, SchemaFormValidator, ValidationIssue};
use crate::workflow::{AliasCreationWorkflow, AliasOutcome, WorkflowError, WorkflowState};

/// Dashboard configuration shared between the editor and its opener.
pub type SharedDashboard = Arc<RwLock<DashboardConfig>>;

/// Static editor configuration.
#[derive(Debug, Clone, Copy)]
pub struct EditorSettings {
    pub help_topics: HelpTopics,
    /// Initial value of the functions-only flag
    pub functions_only: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            help_topics: WIDGET_HELP_TOPICS,
            functions_only: false,
        }
    }
}

/// External collaborators used by a session.
#[derive(Clone)]
pub struct EditorServices {
    pub key_resolver: Arc<dyn DeviceKeyResolver>,
    pub alias_resolver: Arc<dyn AliasResolver>,
    pub schema_parser: Arc<dyn SchemaParser>,
    pub validator: Arc<dyn FormValidator>,
}

impl EditorServices {
    /// Services with the JSON schema parser and the required-property validator.
    pub fn new(key_resolver: Arc<dyn DeviceKeyResolver>, alias_resolver: Arc<dyn AliasResolver>) -> Self {
        Self {
            key_resolver,
            alias_resolver,
            schema_parser: Arc::new(JsonSchemaParser),
            validator: Arc::new(SchemaFormValidator),
        }
    }

    pub fn with_schema_parser(mut self, schema_parser: Arc<dyn SchemaParser>) -> Self {
        self.schema_parser = schema_parser;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn FormValidator>) -> Self {
        self.validator = validator;
        self
    }
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The edit was committed; `widget` carries the new config.
    Committed { widget: Widget, aliases_info: AliasesInfo },
    /// The edit was discarded. Aliases created during the edit are kept.
    Dismissed { aliases_info: AliasesInfo },
}

impl EditOutcome {
    pub fn aliases_info(&self) -> &AliasesInfo {
        match self {
            EditOutcome::Committed { aliases_info, .. } | EditOutcome::Dismissed { aliases_info } => aliases_info,
        }
    }
}

/// Errors raised by a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid settings schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    #[error("An alias dialog is open")]
    Suspended,

    #[error("No datasource at index {index} (have {len})")]
    NoSuchDatasource { index: usize, len: usize },

    #[error("Session is closed")]
    Closed,

    #[error(transparent)]
    Datasource(#[from] DatasourceError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Committed,
    Cancelled,
}

struct PendingAlias {
    workflow: AliasCreationWorkflow,
    target: Option<Arc<DatasourceModel>>,
}

/// One widget edit from open to confirm or cancel.
pub struct WidgetEditSession {
    widget: Widget,
    working: WidgetConfig,
    datasources: Vec<Arc<DatasourceModel>>,
    settings_schema: Schema,
    data_key_schema: Schema,
    dashboard: SharedDashboard,
    aliases_info: Arc<AliasesInfo>,
    services: EditorServices,
    settings: EditorSettings,
    functions_only: bool,
    pending: Option<PendingAlias>,
    state: SessionState,
}

impl WidgetEditSession {
    /// Open an edit of `widget`.
    ///
    /// Schemas come from `widget_type`, preferring the type-specific ones.
    /// Malformed schema text fails the open.
    pub fn open(
        widget: Widget,
        widget_type: &WidgetTypeInfo,
        dashboard: SharedDashboard,
        aliases_info: AliasesInfo,
        services: EditorServices,
    ) -> Result<Self, SessionError> {
        let settings_schema = services
            .schema_parser
            .parse_optional(widget_type.effective_settings_schema())?;
        let data_key_schema = services
            .schema_parser
            .parse_optional(widget_type.effective_data_key_settings_schema())?;

        let mut working = widget.config.clone();
        let datasources = std::mem::take(&mut working.datasources)
            .into_iter()
            .map(|entry| Arc::new(DatasourceModel::new(entry)))
            .collect::<Vec<_>>();

        info!(
            widget = widget.id.as_deref().unwrap_or("<new>"),
            datasources = datasources.len(),
            "Widget edit opened"
        );

        let settings = EditorSettings::default();
        Ok(Self {
            widget,
            working,
            datasources,
            settings_schema,
            data_key_schema,
            dashboard,
            aliases_info: Arc::new(aliases_info),
            services,
            functions_only: settings.functions_only,
            settings,
            pending: None,
            state: SessionState::Open,
        })
    }

    pub fn with_settings(mut self, settings: EditorSettings) -> Self {
        self.functions_only = settings.functions_only;
        self.settings = settings;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The widget as it was opened, or as committed.
    pub fn widget(&self) -> &Widget {
        &self.widget
    }

    pub fn widget_type(&self) -> Option<&WidgetType> {
        self.widget.widget_type.as_ref()
    }

    pub fn settings_schema(&self) -> &Schema {
        &self.settings_schema
    }

    pub fn data_key_settings_schema(&self) -> &Schema {
        &self.data_key_schema
    }

    pub fn aliases_info(&self) -> &AliasesInfo {
        &self.aliases_info
    }

    pub fn dashboard(&self) -> &SharedDashboard {
        &self.dashboard
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Whether an alias dialog holds the session.
    pub fn is_suspended(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.workflow.is_active())
    }

    pub fn help_topic(&self) -> &'static str {
        self.help_topic_for(self.widget.widget_type.as_ref())
    }

    pub fn help_topic_for(&self, widget_type: Option<&WidgetType>) -> &'static str {
        self.settings.help_topics.topic_for(widget_type)
    }

    /// The config as it would be committed now.
    pub fn working_config(&self) -> WidgetConfig {
        let mut config = self.working.clone();
        config.datasources = self.datasources.iter().map(|ds| ds.snapshot()).collect();
        config
    }

    // ========================================================================
    // Datasource slots
    // ========================================================================

    pub fn functions_only(&self) -> bool {
        self.functions_only
    }

    /// Restrict new datasources to functions. Returns the types now offered.
    pub fn set_functions_only(&mut self, functions_only: bool) -> &'static [DatasourceType] {
        if self.functions_only != functions_only {
            debug!(functions_only, "Available datasource types changed");
            self.functions_only = functions_only;
        }
        self.available_datasource_types()
    }

    pub fn available_datasource_types(&self) -> &'static [DatasourceType] {
        DatasourceModel::available_datasource_types(self.functions_only)
    }

    pub fn datasource_count(&self) -> usize {
        self.datasources.len()
    }

    pub fn datasource(&self, index: usize) -> Result<Arc<DatasourceModel>, SessionError> {
        self.datasources
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSuchDatasource {
                index,
                len: self.datasources.len(),
            })
    }

    /// Append an empty datasource of the first available type. Returns its index.
    pub fn add_datasource(&mut self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        let datasource_type = self.available_datasource_types()[0];
        self.datasources
            .push(Arc::new(DatasourceModel::new(DatasourceEntry::empty(datasource_type))));
        debug!(index = self.datasources.len() - 1, ?datasource_type, "Datasource added");
        Ok(self.datasources.len() - 1)
    }

    /// Remove a datasource. Its model is retired so lookups still in flight
    /// for it complete as stale.
    pub fn remove_datasource(&mut self, index: usize) -> Result<DatasourceEntry, SessionError> {
        self.ensure_open()?;
        let model = self.datasource(index)?;
        self.datasources.remove(index);
        model.retire();
        debug!(index, "Datasource removed");
        Ok(model.snapshot())
    }

    pub fn set_settings(&mut self, settings: Value) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.working.settings = settings;
        Ok(())
    }

    // ========================================================================
    // Data keys
    // ========================================================================

    /// A data key labelled with its name, with settings prefilled from the
    /// defaults of the data key settings schema.
    pub fn generate_data_key(&self, name: &str, key_type: DataKeyType) -> DataKey {
        let mut key = DataKey::new(name, key_type);
        key.settings = Value::Object(self.data_key_schema.property_defaults());
        key
    }

    /// Keys of the device behind `alias_id`, resolved with this session's
    /// alias snapshot. The returned future does not borrow the session.
    pub fn fetch_device_keys(
        &self,
        alias_id: &AliasId,
        query: &str,
        key_type: DataKeyType,
    ) -> impl Future<Output = Vec<KeyDescriptor>> + Send + 'static {
        let resolver = Arc::clone(&self.services.key_resolver);
        let aliases_info = Arc::clone(&self.aliases_info);
        let alias_id = alias_id.clone();
        let query = query.to_string();
        async move { fetch_keys_for_alias(resolver.as_ref(), &aliases_info, &alias_id, &query, key_type).await }
    }

    /// Look up keys for the datasource at `index`.
    ///
    /// The lookup context is captured now; if the datasource changes type or
    /// alias, or is removed, before the lookup finishes the result is
    /// [`KeyLookup::Stale`].
    pub fn lookup_keys(
        &self,
        index: usize,
        query: &str,
        key_type: DataKeyType,
    ) -> Result<impl Future<Output = KeyLookup> + Send + 'static, SessionError> {
        let model = self.datasource(index)?;
        let ticket = model.lookup_ticket();
        let resolver = Arc::clone(&self.services.key_resolver);
        let aliases_info = Arc::clone(&self.aliases_info);
        let query = query.to_string();

        Ok(async move {
            model
                .complete_lookup(ticket, resolver.as_ref(), &aliases_info, &query, key_type)
                .await
        })
    }

    // ========================================================================
    // Alias creation
    // ========================================================================

    /// Suspend the session and prepare the alias dialog.
    ///
    /// When `slot` is given, the datasource at that index adopts the alias
    /// once it is created.
    pub async fn begin_alias_creation(
        &mut self,
        proposed_alias: &str,
        slot: Option<usize>,
    ) -> Result<AliasDialogLocals, SessionError> {
        self.ensure_open()?;
        if self.is_suspended() {
            return Err(SessionError::Suspended);
        }

        let target = match slot {
            Some(index) => {
                let model = self.datasource(index)?;
                if model.datasource_type() != DatasourceType::Device {
                    return Err(DatasourceError::NotDeviceBound.into());
                }
                Some(model)
            }
            None => None,
        };

        let mut workflow = AliasCreationWorkflow::new();
        let locals = {
            let dashboard = self.dashboard.read().await;
            workflow.begin(&dashboard.device_aliases, proposed_alias)?
        };
        self.pending = Some(PendingAlias { workflow, target });
        Ok(locals)
    }

    /// Merge the confirmed dialog result and resume the session.
    pub async fn complete_alias_creation(&mut self, draft: AliasDraft) -> Result<DeviceAlias, SessionError> {
        let Some(mut pending) = self.pending.take() else {
            return Err(WorkflowError::InvalidState {
                current: WorkflowState::Idle,
                expected: WorkflowState::AwaitingUserInput,
            }
            .into());
        };

        let mut aliases_info = (*self.aliases_info).clone();
        let merged = {
            let mut dashboard = self.dashboard.write().await;
            pending
                .workflow
                .merge(
                    draft,
                    &mut dashboard.device_aliases,
                    &mut aliases_info,
                    self.services.alias_resolver.as_ref(),
                )
                .await
        };
        let alias = merged?;
        self.aliases_info = Arc::new(aliases_info);

        if let Some(model) = pending.target {
            if let Err(e) = model.set_device_alias(Some(alias.id.clone())) {
                warn!(alias = %alias.id, "Datasource could not adopt the new alias: {}", e);
            }
        }
        Ok(alias)
    }

    /// Dismiss the alias dialog, if one is open.
    pub fn cancel_alias_creation(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            pending.workflow.cancel();
        }
    }

    /// Run the whole alias creation through `host`.
    pub async fn create_device_alias(
        &mut self,
        host: &dyn AliasDialogHost,
        proposed_alias: &str,
        slot: Option<usize>,
    ) -> Result<AliasOutcome, SessionError> {
        let locals = self.begin_alias_creation(proposed_alias, slot).await?;

        match host.open_alias_dialog(locals).await {
            Ok(draft) => Ok(AliasOutcome::Created(self.complete_alias_creation(draft).await?)),
            Err(Dismissed) => {
                self.cancel_alias_creation();
                Ok(AliasOutcome::Cancelled)
            }
        }
    }

    // ========================================================================
    // Commit / Cancel
    // ========================================================================

    /// Validate the working copy and commit it to the widget.
    ///
    /// On failure nothing changes and the session stays open.
    pub async fn confirm(&mut self) -> Result<EditOutcome, SessionError> {
        self.ensure_open()?;
        if self.is_suspended() {
            return Err(SessionError::Suspended);
        }

        let config = self.working_config();
        let mut issues = {
            let dashboard = self.dashboard.read().await;
            check_datasources(&config, &dashboard.device_aliases)
        };
        if self.functions_only {
            issues.extend(
                config
                    .datasources
                    .iter()
                    .enumerate()
                    .filter(|(_, ds)| ds.datasource_type != DatasourceType::Function)
                    .map(|(i, _)| ValidationIssue::new(format!("datasources[{i}]"), "only function datasources are allowed")),
            );
        }
        issues.extend(
            self.services
                .validator
                .validate(&config, &self.settings_schema, &self.data_key_schema),
        );

        if !issues.is_empty() {
            warn!(issues = issues.len(), "Widget config rejected");
            return Err(SessionError::Validation(issues));
        }

        self.widget.config = config;
        self.state = SessionState::Committed;
        self.retire_all();
        info!(widget = self.widget.id.as_deref().unwrap_or("<new>"), "Widget edit committed");

        Ok(EditOutcome::Committed {
            widget: self.widget.clone(),
            aliases_info: (*self.aliases_info).clone(),
        })
    }

    /// Discard the working copy. Returns the current alias snapshot, which
    /// includes aliases created during the edit. Calling it again is harmless.
    pub fn cancel(&mut self) -> EditOutcome {
        if self.state == SessionState::Open {
            self.cancel_alias_creation();
            self.retire_all();
            self.state = SessionState::Cancelled;
            info!(widget = self.widget.id.as_deref().unwrap_or("<new>"), "Widget edit cancelled");
        }
        EditOutcome::Dismissed {
            aliases_info: (*self.aliases_info).clone(),
        }
    }

    fn retire_all(&self) {
        for model in &self.datasources {
            model.retire();
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Open => Ok(()),
            _ => Err(SessionError::Closed),
        }
    }
}
