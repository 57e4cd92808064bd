//! External lookup interfaces.
//!
//! Device keys and alias resolution are served by a device registry outside
//! this crate. Both lookups are asynchronous and may fail; callers in this
//! crate turn failures into empty or unchanged data instead of aborting the
//! edit.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dashwidget_core::{AliasId, AliasRegistry, AliasResolution, AliasesInfo, DataKey, DataKeyType};

/// Errors reported by lookup backends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Lookup service unavailable: {0}")]
    Unavailable(String),
}

/// A key offered by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: DataKeyType,
}

impl KeyDescriptor {
    pub fn new(name: &str, key_type: DataKeyType) -> Self {
        Self {
            name: name.to_string(),
            key_type,
        }
    }

    /// Plain data key for this descriptor, labelled with the key name.
    pub fn to_data_key(&self) -> DataKey {
        DataKey::new(&self.name, self.key_type)
    }
}

/// Looks up the keys a device offers.
pub trait DeviceKeyResolver: Send + Sync {
    /// Keys of `device_id` of the given type whose name matches `query`.
    fn get_keys<'a>(
        &'a self,
        device_id: &'a str,
        query: &'a str,
        key_type: DataKeyType,
    ) -> BoxFuture<'a, Result<Vec<KeyDescriptor>, LookupError>>;
}

/// Resolves a whole alias registry into an [`AliasesInfo`] snapshot.
pub trait AliasResolver: Send + Sync {
    fn resolve<'a>(&'a self, aliases: &'a AliasRegistry) -> BoxFuture<'a, Result<AliasResolution, LookupError>>;
}

/// Fetch keys for the device behind an alias.
///
/// An alias that is unknown or not bound to a device yields no keys right
/// away. Backend failures are logged and also yield no keys.
pub async fn fetch_keys_for_alias(
    resolver: &dyn DeviceKeyResolver,
    aliases_info: &AliasesInfo,
    alias_id: &AliasId,
    query: &str,
    key_type: DataKeyType,
) -> Vec<KeyDescriptor> {
    let Some(device_id) = aliases_info.device_id(alias_id) else {
        debug!(alias = %alias_id, "Alias not bound to a device, no keys to fetch");
        return Vec::new();
    };

    match resolver.get_keys(device_id, query, key_type).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(alias = %alias_id, device = device_id, "Key lookup failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwidget_core::ResolvedAlias;
    use futures::FutureExt;

    struct FailingResolver;

    impl DeviceKeyResolver for FailingResolver {
        fn get_keys<'a>(
            &'a self,
            device_id: &'a str,
            _query: &'a str,
            _key_type: DataKeyType,
        ) -> BoxFuture<'a, Result<Vec<KeyDescriptor>, LookupError>> {
            async move { Err(LookupError::Unavailable(format!("{device_id}: timeout"))) }.boxed()
        }
    }

    struct FixedResolver;

    impl DeviceKeyResolver for FixedResolver {
        fn get_keys<'a>(
            &'a self,
            _device_id: &'a str,
            _query: &'a str,
            key_type: DataKeyType,
        ) -> BoxFuture<'a, Result<Vec<KeyDescriptor>, LookupError>> {
            async move { Ok(vec![KeyDescriptor::new("temperature", key_type)]) }.boxed()
        }
    }

    fn info_with(alias: &str, device: Option<&str>) -> AliasesInfo {
        let mut info = AliasesInfo::default();
        info.device_aliases.insert(
            AliasId::new(alias),
            ResolvedAlias {
                alias: alias.to_string(),
                device_id: device.map(String::from),
            },
        );
        info
    }

    #[tokio::test]
    async fn test_unknown_alias_yields_no_keys() {
        let keys = fetch_keys_for_alias(
            &FixedResolver,
            &AliasesInfo::default(),
            &AliasId::new("missing"),
            "",
            DataKeyType::Timeseries,
        )
        .await;
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_unbound_alias_yields_no_keys() {
        let info = info_with("a", None);
        let keys = fetch_keys_for_alias(&FixedResolver, &info, &AliasId::new("a"), "", DataKeyType::Timeseries).await;
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_yields_no_keys() {
        let info = info_with("a", Some("d1"));
        let keys = fetch_keys_for_alias(&FailingResolver, &info, &AliasId::new("a"), "", DataKeyType::Attribute).await;
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_bound_alias_delegates() {
        let info = info_with("a", Some("d1"));
        let keys = fetch_keys_for_alias(&FixedResolver, &info, &AliasId::new("a"), "te", DataKeyType::Attribute).await;
        assert_eq!(keys, vec![KeyDescriptor::new("temperature", DataKeyType::Attribute)]);
        assert_eq!(keys[0].to_data_key().label, "temperature");
    }
}
