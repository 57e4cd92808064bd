//! Device alias creation workflow.
//!
//! Creating an alias from inside a widget edit opens a nested dialog. The
//! workflow moves through these states:
//!
//! ```text
//! Idle -> AwaitingUserInput -> Merging -> Resumed
//!                  \
//!                   -> Cancelled
//! ```
//!
//! The dialog works on a private copy of the registry. Only a confirmed
//! alias is written to the caller's registry, and it is the only entry
//! written. After the write the whole registry is resolved again; a failed
//! resolution keeps the caller's previous [`AliasesInfo`].

use tracing::{debug, info, warn};
use uuid::Uuid;

use dashwidget_core::{AliasId, AliasRegistry, AliasesInfo, DeviceAlias, RegistryError};

use crate::dialog::{AliasDialogLocals, AliasDraft};
use crate::resolver::AliasResolver;

/// Lifecycle of one alias creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    AwaitingUserInput,
    Merging,
    Resumed,
    Cancelled,
}

impl WorkflowState {
    /// Whether the enclosing edit must stay suspended.
    pub fn is_active(self) -> bool {
        matches!(self, WorkflowState::AwaitingUserInput | WorkflowState::Merging)
    }
}

/// How an alias creation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    /// The alias was written to the registry.
    Created(DeviceAlias),
    /// The user dismissed the dialog; nothing was written.
    Cancelled,
}

/// Errors raised by the workflow.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Alias workflow is {current:?}, expected {expected:?}")]
    InvalidState {
        current: WorkflowState,
        expected: WorkflowState,
    },

    #[error("Alias '{0}' has no device filter")]
    MissingDeviceFilter(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Drives one nested alias creation.
#[derive(Debug)]
pub struct AliasCreationWorkflow {
    state: WorkflowState,
    snapshot: Option<AliasRegistry>,
}

impl AliasCreationWorkflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            snapshot: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Registry copy handed to the dialog, while the dialog is open.
    pub fn snapshot(&self) -> Option<&AliasRegistry> {
        self.snapshot.as_ref()
    }

    /// Snapshot `existing` and prepare the dialog locals.
    pub fn begin(&mut self, existing: &AliasRegistry, proposed_alias: &str) -> Result<AliasDialogLocals, WorkflowError> {
        self.expect_state(WorkflowState::Idle)?;

        let snapshot = existing.clone();
        self.snapshot = Some(snapshot.clone());
        self.state = WorkflowState::AwaitingUserInput;
        debug!(alias = proposed_alias, "Alias dialog opened");

        Ok(AliasDialogLocals {
            device_aliases: snapshot,
            is_single_device_alias: true,
            single_device_alias: AliasDraft::named(proposed_alias),
            widgets: None,
        })
    }

    /// Write the confirmed alias into `registry` and re-resolve it.
    ///
    /// `aliases_info` is replaced only by a successful resolution. If the
    /// alias cannot be written, nothing is mutated and the workflow ends
    /// cancelled.
    pub async fn merge(
        &mut self,
        draft: AliasDraft,
        registry: &mut AliasRegistry,
        aliases_info: &mut AliasesInfo,
        resolver: &dyn AliasResolver,
    ) -> Result<DeviceAlias, WorkflowError> {
        self.expect_state(WorkflowState::AwaitingUserInput)?;
        self.state = WorkflowState::Merging;

        let Some(device_filter) = draft.device_filter else {
            self.abort();
            return Err(WorkflowError::MissingDeviceFilter(draft.alias));
        };
        let id = draft
            .id
            .filter(|id| !id.as_str().is_empty())
            .unwrap_or_else(mint_alias_id);
        let alias = DeviceAlias::new(id, &draft.alias, device_filter);

        if let Err(e) = registry.upsert(&alias) {
            self.abort();
            return Err(e.into());
        }
        self.snapshot = None;
        info!(alias = %alias.alias, id = %alias.id, "Device alias saved");

        match resolver.resolve(registry).await {
            Ok(resolution) if !resolution.error => *aliases_info = resolution.aliases_info,
            Ok(_) => warn!("Alias resolution reported an error, keeping previous aliases"),
            Err(e) => warn!("Alias resolution failed, keeping previous aliases: {}", e),
        }

        self.state = WorkflowState::Resumed;
        Ok(alias)
    }

    /// Dismiss the dialog. Only an open dialog can be cancelled; calling this
    /// in any other state changes nothing.
    pub fn cancel(&mut self) {
        if self.state == WorkflowState::AwaitingUserInput {
            self.abort();
            debug!("Alias dialog dismissed");
        }
    }

    fn abort(&mut self) {
        self.snapshot = None;
        self.state = WorkflowState::Cancelled;
    }

    fn expect_state(&self, expected: WorkflowState) -> Result<(), WorkflowError> {
        if self.state != expected {
            return Err(WorkflowError::InvalidState {
                current: self.state,
                expected,
            });
        }
        Ok(())
    }
}

impl Default for AliasCreationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

fn mint_alias_id() -> AliasId {
    AliasId::new(Uuid::new_v4().to_string())
}
