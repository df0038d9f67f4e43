//! Integration trait and registry

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use tracing::debug;

use crate::config_flow::ConfigFlow;
use crate::hass::HomeAssistant;
use crate::setup::SetupError;

/// An integration the host can set up
///
/// Every hook has a default, so an integration only implements what it
/// supports.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Integration domain (e.g., "almond")
    fn domain(&self) -> &'static str;

    /// Domains that must be set up first
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Set up the component from the full configuration
    ///
    /// Returning `Ok(false)` marks the setup as failed without an error.
    async fn async_setup(
        &self,
        _hass: &Arc<HomeAssistant>,
        _config: &serde_json::Value,
    ) -> Result<bool, SetupError> {
        Ok(true)
    }

    /// Set up a config entry of this domain
    async fn async_setup_entry(
        &self,
        _hass: &Arc<HomeAssistant>,
        _entry: &ConfigEntry,
    ) -> Result<bool, SetupError> {
        Ok(true)
    }

    /// Unload a config entry of this domain
    async fn async_unload_entry(
        &self,
        _hass: &Arc<HomeAssistant>,
        _entry: &ConfigEntry,
    ) -> Result<bool, SetupError> {
        Ok(true)
    }

    /// A fresh config flow handler, if the integration can be set up via flows
    fn config_flow(&self) -> Option<Box<dyn ConfigFlow>> {
        None
    }
}

/// Integrations known to an instance, by domain
#[derive(Default)]
pub struct IntegrationRegistry {
    integrations: DashMap<String, Arc<dyn Integration>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration, replacing one with the same domain
    pub fn register(&self, integration: Arc<dyn Integration>) {
        debug!("Registered integration: {}", integration.domain());
        self.integrations
            .insert(integration.domain().to_string(), integration);
    }

    pub fn get(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|i| i.value().clone())
    }

    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.integrations.iter().map(|i| i.key().clone()).collect();
        domains.sort();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Integration for Dummy {
        fn domain(&self) -> &'static str {
            "dummy"
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = IntegrationRegistry::new();
        registry.register(Arc::new(Dummy));

        assert!(registry.get("dummy").is_some());
        assert!(registry.get("almond").is_none());
        assert_eq!(registry.domains(), vec!["dummy".to_string()]);
        assert!(registry.get("dummy").unwrap().config_flow().is_none());
    }
}
