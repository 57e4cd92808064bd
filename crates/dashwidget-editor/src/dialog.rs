//! Presentation boundary for the alias creation sub-dialog.
//!
//! The dialog itself is rendered elsewhere. This crate only needs a host
//! that opens it with some locals and resolves with the user's input, or
//! rejects when the user dismisses it.

use std::collections::VecDeque;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use dashwidget_core::{AliasId, AliasRegistry, DeviceFilter};

/// The user closed the dialog without confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Dialog dismissed")]
pub struct Dismissed;

/// Alias as edited in the dialog. `id` is `None` for a new alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDraft {
    pub id: Option<AliasId>,
    pub alias: String,
    pub device_filter: Option<DeviceFilter>,
}

impl AliasDraft {
    /// A new alias with the given name and no filter yet.
    pub fn named(alias: &str) -> Self {
        Self {
            id: None,
            alias: alias.to_string(),
            device_filter: None,
        }
    }

    pub fn with_filter(mut self, device_filter: DeviceFilter) -> Self {
        self.device_filter = Some(device_filter);
        self
    }
}

/// Values handed to the alias dialog when it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDialogLocals {
    /// Private copy of the registry; edits to it never reach the dashboard
    pub device_aliases: AliasRegistry,

    pub is_single_device_alias: bool,

    pub single_device_alias: AliasDraft,

    /// Dashboard widgets; never offered when creating a single alias
    pub widgets: Option<Value>,
}

/// Opens the alias dialog.
pub trait AliasDialogHost: Send + Sync {
    fn open_alias_dialog(&self, locals: AliasDialogLocals) -> BoxFuture<'_, Result<AliasDraft, Dismissed>>;
}

/// Host that answers dialogs from a queue of prepared responses.
///
/// Used by tests and the demo binary in place of a real UI. When the queue
/// runs dry every further dialog is dismissed.
#[derive(Debug, Default)]
pub struct ScriptedDialogHost {
    responses: Mutex<VecDeque<Result<AliasDraft, Dismissed>>>,
    opened: Mutex<Vec<AliasDialogLocals>>,
}

impl ScriptedDialogHost {
    pub fn new(responses: impl IntoIterator<Item = Result<AliasDraft, Dismissed>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Locals of every dialog opened so far.
    pub async fn opened(&self) -> Vec<AliasDialogLocals> {
        self.opened.lock().await.clone()
    }
}

impl AliasDialogHost for ScriptedDialogHost {
    fn open_alias_dialog(&self, locals: AliasDialogLocals) -> BoxFuture<'_, Result<AliasDraft, Dismissed>> {
        async move {
            self.opened.lock().await.push(locals);
            self.responses.lock().await.pop_front().unwrap_or(Err(Dismissed))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locals_serialize_with_null_widgets() {
        let locals = AliasDialogLocals {
            device_aliases: AliasRegistry::new(),
            is_single_device_alias: true,
            single_device_alias: AliasDraft::named("Sensor A"),
            widgets: None,
        };

        let value = serde_json::to_value(&locals).unwrap();
        assert_eq!(value["widgets"], Value::Null);
        assert!(value.as_object().unwrap().contains_key("widgets"));
        assert_eq!(value["isSingleDeviceAlias"], json!(true));
    }

    #[tokio::test]
    async fn test_scripted_host_records_and_dismisses_when_exhausted() {
        let host = ScriptedDialogHost::new([Ok(AliasDraft::named("Boiler"))]);
        let locals = AliasDialogLocals {
            device_aliases: AliasRegistry::new(),
            is_single_device_alias: true,
            single_device_alias: AliasDraft::named("Boiler"),
            widgets: None,
        };

        assert_eq!(host.open_alias_dialog(locals.clone()).await, Ok(AliasDraft::named("Boiler")));
        assert_eq!(host.open_alias_dialog(locals).await, Err(Dismissed));
        assert_eq!(host.opened().await.len(), 2);
    }
}
