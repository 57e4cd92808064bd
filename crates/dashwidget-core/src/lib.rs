//! # dashwidget-core
//!
//! Configuration model for dashboard widgets and their datasources.
//!
//! This crate provides:
//! - Datasource and data key types (device-bound or function-bound)
//! - The dashboard device alias registry and its resolved snapshot
//! - Settings schema parsing with empty-input normalization
//! - Help topic lookup per widget type
//! - Configuration storage abstraction
//!
//! This crate is intentionally runtime-agnostic and contains no async code.
//! The edit protocol built on top of it lives in `dashwidget-editor`.

pub mod config;
pub mod help;
pub mod model;
pub mod registry;
pub mod schema;

pub use config::{ConfigError, ConfigStorage, MemoryConfigStorage};
pub use help::{HelpTopics, WIDGET_HELP_TOPICS};
pub use model::*;
pub use registry::{
    AliasEntry, AliasRegistry, AliasResolution, AliasesInfo, DeviceAlias, DeviceFilter,
    RegistryError, ResolvedAlias,
};
pub use schema::{JsonSchemaParser, Schema, SchemaError, SchemaParser};
