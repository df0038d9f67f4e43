//! Component and config entry setup

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use ha_config_entries::{ConfigEntriesError, ConfigEntry, ConfigEntryState};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::hass::HomeAssistant;
use crate::integration::Integration;

/// Errors raised while setting up components and entries
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Integration not found: {0}")]
    IntegrationNotFound(String),

    #[error("Invalid config for [{domain}]: {reason}")]
    InvalidConfig { domain: String, reason: String },

    #[error("Dependency cycle while setting up {0}")]
    DependencyCycle(String),

    #[error("Unable to set up dependency {dependency} of {domain}")]
    DependencyFailed { domain: String, dependency: String },

    #[error("Setup failed: {0}")]
    Failed(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

/// Set up a component and its dependencies
///
/// Returns `true` when the component is (or already was) set up. Failures
/// are logged, never returned.
pub async fn async_setup_component(
    hass: &Arc<HomeAssistant>,
    domain: &str,
    config: &serde_json::Value,
) -> bool {
    match setup_component(hass, domain, config, Vec::new()).await {
        Ok(()) => true,
        Err(err) => {
            error!("Setup failed for {}: {}", domain, err);
            false
        }
    }
}

fn setup_component<'a>(
    hass: &'a Arc<HomeAssistant>,
    domain: &'a str,
    config: &'a serde_json::Value,
    mut chain: Vec<String>,
) -> BoxFuture<'a, Result<(), SetupError>> {
    async move {
        if hass.is_component_loaded(domain) {
            return Ok(());
        }
        if chain.iter().any(|d| d == domain) {
            return Err(SetupError::DependencyCycle(domain.to_string()));
        }
        chain.push(domain.to_string());

        let integration = hass
            .integrations
            .get(domain)
            .ok_or_else(|| SetupError::IntegrationNotFound(domain.to_string()))?;

        for dependency in integration.dependencies() {
            setup_component(hass, dependency, config, chain.clone())
                .await
                .map_err(|err| {
                    warn!("Dependency {} of {} failed: {}", dependency, domain, err);
                    SetupError::DependencyFailed {
                        domain: domain.to_string(),
                        dependency: dependency.to_string(),
                    }
                })?;
        }

        debug!("Setting up {}", domain);
        if !integration.async_setup(hass, config).await? {
            return Err(SetupError::Failed(format!(
                "integration {} reported failure",
                domain
            )));
        }
        hass.mark_component_loaded(domain);
        info!("Setup of domain {} complete", domain);

        for entry in hass.config_entries.get_by_domain(domain) {
            if entry.state == ConfigEntryState::NotLoaded {
                setup_entry(hass, integration.as_ref(), &entry).await?;
            }
        }

        Ok(())
    }
    .boxed()
}

/// Set up a config entry, setting up its component first if needed
pub async fn async_setup_entry(
    hass: &Arc<HomeAssistant>,
    entry_id: &str,
) -> Result<bool, SetupError> {
    let entry = hass
        .config_entries
        .get(entry_id)
        .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

    if !hass.is_component_loaded(&entry.domain) {
        // Component setup sets up all of the domain's entries, this one included
        let config = hass.component_config();
        setup_component(hass, &entry.domain, &config, Vec::new()).await?;
        return Ok(hass
            .config_entries
            .get(entry_id)
            .map_or(false, |e| e.is_loaded()));
    }

    let integration = hass
        .integrations
        .get(&entry.domain)
        .ok_or_else(|| SetupError::IntegrationNotFound(entry.domain.clone()))?;
    setup_entry(hass, integration.as_ref(), &entry).await
}

async fn setup_entry(
    hass: &Arc<HomeAssistant>,
    integration: &dyn Integration,
    entry: &ConfigEntry,
) -> Result<bool, SetupError> {
    if entry.is_disabled() {
        debug!("Skipping setup for disabled entry: {}", entry.entry_id);
        return Ok(false);
    }

    let entries = &hass.config_entries;
    entries.transition(&entry.entry_id, ConfigEntryState::SetupInProgress, None)?;

    match integration.async_setup_entry(hass, entry).await {
        Ok(true) => {
            entries.transition(&entry.entry_id, ConfigEntryState::Loaded, None)?;
            info!("Setup completed for entry: {} ({})", entry.title, entry.entry_id);
            Ok(true)
        }
        Ok(false) => {
            warn!("Setup of entry {} returned false", entry.entry_id);
            entries.transition(&entry.entry_id, ConfigEntryState::SetupError, None)?;
            Ok(false)
        }
        Err(err) => {
            error!("Error setting up entry {}: {}", entry.entry_id, err);
            entries.transition(
                &entry.entry_id,
                ConfigEntryState::SetupError,
                Some(err.to_string()),
            )?;
            Ok(false)
        }
    }
}

/// Unload a config entry
///
/// Entries that never loaded count as unloaded.
pub async fn async_unload_entry(
    hass: &Arc<HomeAssistant>,
    entry_id: &str,
) -> Result<bool, SetupError> {
    let entry = hass
        .config_entries
        .get(entry_id)
        .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

    match entry.state {
        ConfigEntryState::Loaded => {}
        ConfigEntryState::NotLoaded
        | ConfigEntryState::MigrationError
        | ConfigEntryState::FailedUnload => return Ok(true),
        ConfigEntryState::SetupInProgress | ConfigEntryState::UnloadInProgress => {
            warn!("Entry {} is busy ({:?}), not unloading", entry_id, entry.state);
            return Ok(false);
        }
        ConfigEntryState::SetupError | ConfigEntryState::SetupRetry => {
            // Failed setups have nothing to tear down
            hass.config_entries.transition(
                entry_id,
                ConfigEntryState::UnloadInProgress,
                None,
            )?;
            hass.config_entries
                .transition(entry_id, ConfigEntryState::NotLoaded, None)?;
            return Ok(true);
        }
    }

    let integration = hass
        .integrations
        .get(&entry.domain)
        .ok_or_else(|| SetupError::IntegrationNotFound(entry.domain.clone()))?;

    hass.config_entries
        .transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;
    let (state, unloaded) = match integration.async_unload_entry(hass, &entry).await {
        Ok(true) => (ConfigEntryState::NotLoaded, true),
        Ok(false) => (ConfigEntryState::FailedUnload, false),
        Err(err) => {
            error!("Error unloading entry {}: {}", entry_id, err);
            (ConfigEntryState::FailedUnload, false)
        }
    };
    hass.config_entries.transition(entry_id, state, None)?;
    Ok(unloaded)
}

/// Unload and delete a config entry
pub async fn async_remove_entry(
    hass: &Arc<HomeAssistant>,
    entry_id: &str,
) -> Result<ConfigEntry, SetupError> {
    if !async_unload_entry(hass, entry_id).await? {
        warn!("Removing entry {} that failed to unload", entry_id);
    }
    Ok(hass.config_entries.remove(entry_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ha_config::CoreConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        deps: &'static [&'static str],
        setups: AtomicUsize,
        entry_setups: AtomicUsize,
        fail_entry: bool,
    }

    #[async_trait]
    impl Integration for Recorder {
        fn domain(&self) -> &'static str {
            self.name
        }

        fn dependencies(&self) -> &'static [&'static str] {
            self.deps
        }

        async fn async_setup(
            &self,
            _hass: &Arc<HomeAssistant>,
            _config: &serde_json::Value,
        ) -> Result<bool, SetupError> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn async_setup_entry(
            &self,
            _hass: &Arc<HomeAssistant>,
            _entry: &ConfigEntry,
        ) -> Result<bool, SetupError> {
            self.entry_setups.fetch_add(1, Ordering::SeqCst);
            if self.fail_entry {
                return Err(SetupError::Failed("cannot connect".into()));
            }
            Ok(true)
        }
    }

    fn hass() -> (TempDir, Arc<HomeAssistant>) {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        (dir, hass)
    }

    #[tokio::test]
    async fn test_setup_component_with_dependency() {
        let (_dir, hass) = hass();
        let child = Arc::new(Recorder {
            name: "child",
            deps: &["http"],
            ..Default::default()
        });
        hass.integrations.register(child.clone());

        assert!(async_setup_component(&hass, "child", &json!({})).await);
        assert!(async_setup_component(&hass, "child", &json!({})).await);

        assert_eq!(child.setups.load(Ordering::SeqCst), 1);
        assert_eq!(hass.components(), vec!["child".to_string(), "http".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_component() {
        let (_dir, hass) = hass();
        assert!(!async_setup_component(&hass, "nope", &json!({})).await);
    }

    #[tokio::test]
    async fn test_dependency_cycle() {
        let (_dir, hass) = hass();
        hass.integrations.register(Arc::new(Recorder {
            name: "a",
            deps: &["b"],
            ..Default::default()
        }));
        hass.integrations.register(Arc::new(Recorder {
            name: "b",
            deps: &["a"],
            ..Default::default()
        }));

        assert!(!async_setup_component(&hass, "a", &json!({})).await);
        assert!(!hass.is_component_loaded("a"));
    }

    #[tokio::test]
    async fn test_component_setup_loads_existing_entries() {
        let (_dir, hass) = hass();
        let recorder = Arc::new(Recorder {
            name: "rec",
            ..Default::default()
        });
        hass.integrations.register(recorder.clone());
        let entry = hass
            .config_entries
            .add(ConfigEntry::new("rec", "Rec"))
            .await
            .unwrap();

        assert!(async_setup_component(&hass, "rec", &json!({})).await);
        assert_eq!(recorder.entry_setups.load(Ordering::SeqCst), 1);
        assert!(hass.config_entries.get(&entry.entry_id).unwrap().is_loaded());

        assert!(async_unload_entry(&hass, &entry.entry_id).await.unwrap());
        assert_eq!(
            hass.config_entries.get(&entry.entry_id).unwrap().state,
            ConfigEntryState::NotLoaded
        );

        assert!(async_setup_entry(&hass, &entry.entry_id).await.unwrap());
        assert_eq!(recorder.entry_setups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_entry_setup_error_recorded() {
        let (_dir, hass) = hass();
        hass.integrations.register(Arc::new(Recorder {
            name: "rec",
            fail_entry: true,
            ..Default::default()
        }));
        let entry = hass
            .config_entries
            .add(ConfigEntry::new("rec", "Rec"))
            .await
            .unwrap();

        assert!(!async_setup_entry(&hass, &entry.entry_id).await.unwrap());
        let entry = hass.config_entries.get(&entry.entry_id).unwrap();
        assert_eq!(entry.state, ConfigEntryState::SetupError);
        assert_eq!(entry.reason.as_deref(), Some("Setup failed: cannot connect"));

        let removed = async_remove_entry(&hass, &entry.entry_id).await.unwrap();
        assert_eq!(removed.entry_id, entry.entry_id);
        assert!(hass.config_entries.is_empty());
    }
}
