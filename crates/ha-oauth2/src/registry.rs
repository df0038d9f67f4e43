//! Registered implementations per integration domain

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use ha_config_entries::ConfigEntry;
use ha_runtime::HomeAssistant;
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{OAuth2Error, OAuth2Result};
use crate::implementation::OAuth2Implementation;
use crate::view::callback_router;

type Implementations = IndexMap<String, Arc<dyn OAuth2Implementation>>;

#[derive(Default)]
struct OAuth2Registry {
    /// Integration domain -> implementation domain -> implementation
    implementations: RwLock<HashMap<String, Implementations>>,
    view_registered: AtomicBool,
}

fn registry(hass: &HomeAssistant) -> Arc<OAuth2Registry> {
    hass.data.get_or_insert_with(OAuth2Registry::default)
}

/// Register an implementation for `domain`
///
/// The first implementation that needs the callback view registers it.
pub fn async_register_implementation(
    hass: &HomeAssistant,
    domain: &str,
    implementation: Arc<dyn OAuth2Implementation>,
) {
    let registry = registry(hass);

    if implementation.uses_callback_view() && !registry.view_registered.swap(true, Ordering::SeqCst)
    {
        debug!("Registering OAuth2 callback view");
        hass.http.register_router(callback_router());
    }

    debug!(
        "Registered OAuth2 implementation {} for {}",
        implementation.domain(),
        domain
    );
    registry
        .implementations
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .entry(domain.to_string())
        .or_default()
        .insert(implementation.domain().to_string(), implementation);
}

/// Implementations registered for `domain`, in registration order
pub fn async_get_implementations(hass: &HomeAssistant, domain: &str) -> Implementations {
    registry(hass)
        .implementations
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(domain)
        .cloned()
        .unwrap_or_default()
}

/// The implementation a config entry was created with
pub fn async_get_config_entry_implementation(
    hass: &HomeAssistant,
    entry: &ConfigEntry,
) -> OAuth2Result<Arc<dyn OAuth2Implementation>> {
    let implementation = entry.data_str("auth_implementation").unwrap_or_default();
    async_get_implementations(hass, &entry.domain)
        .get(implementation)
        .cloned()
        .ok_or_else(|| OAuth2Error::UnknownImplementation {
            domain: entry.domain.clone(),
            implementation: implementation.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::LocalOAuth2Implementation;
    use ha_config::CoreConfig;
    use serde_json::json;
    use std::collections::HashMap as Map;
    use tempfile::TempDir;

    fn local(domain: &str) -> Arc<dyn OAuth2Implementation> {
        Arc::new(LocalOAuth2Implementation::new(
            domain,
            "id",
            "secret",
            "https://provider.example/authorize",
            "https://provider.example/token",
        ))
    }

    #[tokio::test]
    async fn test_registration_order_and_lookup() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());

        assert!(async_get_implementations(&hass, "almond").is_empty());
        async_register_implementation(&hass, "almond", local("almond"));
        async_register_implementation(&hass, "almond", local("cloud"));
        async_register_implementation(&hass, "other", local("other"));

        let keys: Vec<_> = async_get_implementations(&hass, "almond")
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["almond".to_string(), "cloud".to_string()]);

        let mut data = Map::new();
        data.insert("auth_implementation".to_string(), json!("cloud"));
        let entry = ConfigEntry::new("almond", "Almond").with_data(data);
        let implementation = async_get_config_entry_implementation(&hass, &entry).unwrap();
        assert_eq!(implementation.domain(), "cloud");

        let entry = ConfigEntry::new("almond", "Almond");
        assert!(matches!(
            async_get_config_entry_implementation(&hass, &entry),
            Err(OAuth2Error::UnknownImplementation { .. })
        ));
    }
}
