//! Datasource model with explicit change notification.
//!
//! A [`DatasourceModel`] owns the state of one datasource slot. Views observe
//! it through a `watch` receiver. Every logical mutation is applied to a copy
//! and published with a single `send_replace`, so one mutation produces at
//! most one notification, and a mutation that leaves the entry unchanged
//! produces none.
//!
//! Key lookups are tagged with a lookup generation. The generation moves on
//! whenever the datasource type or alias changes or the slot is retired, and
//! a lookup that completes under a newer generation is reported as stale.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use dashwidget_core::{
    available_datasource_types, AliasId, AliasesInfo, DataKey, DataKeyType, DatasourceEntry,
    DatasourceType,
};

use crate::resolver::{fetch_keys_for_alias, DeviceKeyResolver, KeyDescriptor};

/// Errors raised by datasource mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasourceError {
    #[error("Data key index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Function datasources cannot reference a device alias")]
    NotDeviceBound,

    #[error("Datasource slot was removed")]
    Retired,
}

/// Outcome of a key lookup started on a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    /// Keys for the context the lookup was started in.
    Fresh(Vec<KeyDescriptor>),
    /// The datasource changed (or was removed) while the lookup was running.
    Stale,
}

impl KeyLookup {
    /// Keys to offer the user; stale results offer nothing.
    pub fn into_keys(self) -> Vec<KeyDescriptor> {
        match self {
            KeyLookup::Fresh(keys) => keys,
            KeyLookup::Stale => Vec::new(),
        }
    }
}

/// Lookup context captured when a key lookup starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    generation: u64,
    alias_id: Option<AliasId>,
}

/// State of one datasource slot of a widget under edit.
#[derive(Debug)]
pub struct DatasourceModel {
    state: watch::Sender<DatasourceEntry>,
    /// Number of change notifications emitted so far.
    revision: AtomicU64,
    /// Lookup context; bumped on type/alias change and retirement.
    generation: AtomicU64,
    retired: AtomicBool,
    /// Serializes mutations so each one reads the entry the previous one wrote.
    writer: Mutex<()>,
}

impl DatasourceModel {
    pub fn new(entry: DatasourceEntry) -> Self {
        let (state, _) = watch::channel(entry);
        Self {
            state,
            revision: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            retired: AtomicBool::new(false),
            writer: Mutex::new(()),
        }
    }

    /// Datasource types selectable in a picker.
    pub fn available_datasource_types(functions_only: bool) -> &'static [DatasourceType] {
        available_datasource_types(functions_only)
    }

    /// Observe the entry. The receiver sees one change per mutation.
    pub fn subscribe(&self) -> watch::Receiver<DatasourceEntry> {
        self.state.subscribe()
    }

    /// Copy of the current entry.
    pub fn snapshot(&self) -> DatasourceEntry {
        self.state.borrow().clone()
    }

    pub fn datasource_type(&self) -> DatasourceType {
        self.state.borrow().datasource_type
    }

    pub fn device_alias_id(&self) -> Option<AliasId> {
        self.state.borrow().device_alias_id.clone()
    }

    pub fn data_key_count(&self) -> usize {
        self.state.borrow().data_keys.len()
    }

    /// Number of change notifications emitted so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Detach the model from its slot. Later mutations fail and in-flight
    /// lookups complete as stale.
    pub fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Replace the whole entry, as when a view renders a stored value.
    ///
    /// Applying an entry equal to the current one is a no-op. Returns whether
    /// a notification was emitted.
    pub fn apply(&self, entry: DatasourceEntry) -> Result<bool, DatasourceError> {
        self.mutate(|current| {
            if *current == entry {
                return Ok((false, false));
            }
            *current = entry;
            Ok((true, true))
        })
    }

    /// Switch the datasource type.
    ///
    /// A real switch discards all data keys (their validity is scoped to the
    /// previous type) and drops the alias when moving to `Function`. Setting
    /// the current type again changes nothing. Returns whether the type changed.
    pub fn set_type(&self, datasource_type: DatasourceType) -> Result<bool, DatasourceError> {
        self.mutate(|current| {
            if current.datasource_type == datasource_type {
                return Ok((false, false));
            }
            debug!(from = ?current.datasource_type, to = ?datasource_type, "Datasource type changed, clearing data keys");
            current.datasource_type = datasource_type;
            current.data_keys.clear();
            if datasource_type == DatasourceType::Function {
                current.device_alias_id = None;
            }
            Ok((true, true))
        })
    }

    /// Bind a device datasource to an alias (or unbind it with `None`).
    pub fn set_device_alias(&self, alias_id: Option<AliasId>) -> Result<bool, DatasourceError> {
        self.mutate(|current| {
            if !current.is_device_bound() {
                return Err(DatasourceError::NotDeviceBound);
            }
            if current.device_alias_id == alias_id {
                return Ok((false, false));
            }
            current.device_alias_id = alias_id;
            Ok((true, true))
        })
    }

    /// Append a data key.
    pub fn add_data_key(&self, key: DataKey) -> Result<(), DatasourceError> {
        self.mutate(|current| {
            current.data_keys.push(key);
            Ok(((), true))
        })
    }

    /// Replace the data key at `index`, keeping its position.
    pub fn update_data_key(&self, index: usize, key: DataKey) -> Result<(), DatasourceError> {
        self.mutate(|current| {
            let len = current.data_keys.len();
            let slot = current
                .data_keys
                .get_mut(index)
                .ok_or(DatasourceError::IndexOutOfRange { index, len })?;
            if *slot == key {
                return Ok(((), false));
            }
            *slot = key;
            Ok(((), true))
        })
    }

    /// Remove and return the data key at `index`.
    pub fn remove_data_key(&self, index: usize) -> Result<DataKey, DatasourceError> {
        self.mutate(|current| {
            let len = current.data_keys.len();
            if index >= len {
                return Err(DatasourceError::IndexOutOfRange { index, len });
            }
            Ok((current.data_keys.remove(index), true))
        })
    }

    /// Move the data key at `from` so it ends up at `to`.
    pub fn reorder_data_key(&self, from: usize, to: usize) -> Result<(), DatasourceError> {
        self.mutate(|current| {
            let len = current.data_keys.len();
            for index in [from, to] {
                if index >= len {
                    return Err(DatasourceError::IndexOutOfRange { index, len });
                }
            }
            if from == to {
                return Ok(((), false));
            }
            let key = current.data_keys.remove(from);
            current.data_keys.insert(to, key);
            Ok(((), true))
        })
    }

    /// Capture the current lookup context.
    pub fn lookup_ticket(&self) -> LookupTicket {
        // Generation before state: a writer publishes the entry first and
        // bumps the generation after, so a ticket can only err towards stale.
        let generation = self.generation.load(Ordering::Acquire);
        let current = self.state.borrow();
        let alias_id = if current.is_device_bound() && !self.is_retired() {
            current.device_alias_id.clone()
        } else {
            None
        };
        LookupTicket { generation, alias_id }
    }

    /// Fetch keys for the alias this datasource is bound to.
    ///
    /// The lookup context is captured when this is called, not when the
    /// future is first polled. Function datasources and device datasources
    /// without an alias get no keys.
    pub fn fetch_keys<'a>(
        &'a self,
        resolver: &'a dyn DeviceKeyResolver,
        aliases_info: &'a AliasesInfo,
        query: &'a str,
        key_type: DataKeyType,
    ) -> impl Future<Output = KeyLookup> + Send + 'a {
        let ticket = self.lookup_ticket();
        self.complete_lookup(ticket, resolver, aliases_info, query, key_type)
    }

    /// Run the lookup described by `ticket` and check it is still current.
    pub async fn complete_lookup(
        &self,
        ticket: LookupTicket,
        resolver: &dyn DeviceKeyResolver,
        aliases_info: &AliasesInfo,
        query: &str,
        key_type: DataKeyType,
    ) -> KeyLookup {
        let keys = match &ticket.alias_id {
            Some(alias_id) => fetch_keys_for_alias(resolver, aliases_info, alias_id, query, key_type).await,
            None => Vec::new(),
        };

        if self.generation.load(Ordering::Acquire) != ticket.generation {
            debug!(discarded = keys.len(), "Discarding key lookup for a stale datasource context");
            return KeyLookup::Stale;
        }
        KeyLookup::Fresh(keys)
    }

    /// Run one logical mutation on a copy of the entry. `f` returns its
    /// result and whether the entry changed; a change publishes the copy with
    /// exactly one notification. A changed type or alias moves the lookup
    /// generation.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut DatasourceEntry) -> Result<(R, bool), DatasourceError>,
    ) -> Result<R, DatasourceError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_retired() {
            return Err(DatasourceError::Retired);
        }

        let mut next = self.snapshot();
        let (value, changed) = f(&mut next)?;
        if !changed {
            return Ok(value);
        }

        let previous = self.state.send_replace(next);
        self.revision.fetch_add(1, Ordering::AcqRel);

        let current = self.state.borrow();
        if previous.datasource_type != current.datasource_type
            || previous.device_alias_id != current.device_alias_id
        {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        Ok(value)
    }
}

impl Default for DatasourceModel {
    fn default() -> Self {
        Self::new(DatasourceEntry::default())
    }
}
