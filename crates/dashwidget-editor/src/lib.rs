//! # dashwidget-editor
//!
//! Edit protocol for widget datasources.
//!
//! This crate provides:
//! - [`DatasourceModel`]: one datasource slot with explicit change notification
//! - Resolver traits for device keys and alias resolution
//! - [`AliasCreationWorkflow`]: the nested "create alias" dialog flow
//! - [`WidgetEditSession`]: the transactional widget edit
//! - An in-memory device registry for tests and demos
//!
//! Everything here is cooperative and single-threaded in spirit: futures
//! are awaited by the caller, nothing is spawned.

pub mod datasource;
pub mod dialog;
pub mod memory;
pub mod resolver;
pub mod session;
pub mod validate;
pub mod workflow;

pub use dashwidget_core::*;

pub use datasource::{DatasourceError, DatasourceModel, KeyLookup, LookupTicket};
pub use dialog::{AliasDialogHost, AliasDialogLocals, AliasDraft, Dismissed, ScriptedDialogHost};
pub use memory::{DeviceRecord, InMemoryDeviceRegistry};
pub use resolver::{fetch_keys_for_alias, AliasResolver, DeviceKeyResolver, KeyDescriptor, LookupError};
pub use session::{EditOutcome, EditorServices, EditorSettings, SessionError, SharedDashboard, WidgetEditSession};
pub use validate::{check_datasources, FormValidator, SchemaFormValidator, ValidationIssue};
pub use workflow::{AliasCreationWorkflow, AliasOutcome, WorkflowError, WorkflowState};
