//! The Home Assistant instance

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use dashmap::DashSet;
use ha_config::CoreConfig;
use ha_config_entries::{ConfigEntries, ConfigEntriesResult, Storage};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::config_flow::FlowManager;
use crate::data::HassData;
use crate::http::{HttpApp, HttpIntegration};
use crate::integration::IntegrationRegistry;

/// The central Home Assistant instance
///
/// Always handled as `Arc<HomeAssistant>`; the flow manager keeps a weak
/// reference back to it.
pub struct HomeAssistant {
    config_dir: PathBuf,
    /// `homeassistant:` section of the configuration
    pub core_config: CoreConfig,
    pub bus: EventBus,
    /// Per-instance typed storage for integrations
    pub data: HassData,
    pub config_entries: ConfigEntries,
    /// Config flow manager (`hass.config_entries.flow`)
    pub flow: FlowManager,
    pub integrations: IntegrationRegistry,
    pub http: HttpApp,
    /// Shared outbound HTTP client
    client: reqwest::Client,
    /// Domains whose component setup has completed
    components: DashSet<String>,
    /// Full configuration, used when an entry needs its component set up
    component_config: RwLock<serde_json::Value>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HomeAssistant {
    /// Create an instance storing its state under `config_dir`
    pub fn new(config_dir: impl AsRef<Path>, core_config: CoreConfig) -> Arc<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let storage = Arc::new(Storage::new(&config_dir));

        let hass = Arc::new_cyclic(|weak| Self {
            config_dir,
            core_config,
            bus: EventBus::new(),
            data: HassData::new(),
            config_entries: ConfigEntries::new(storage),
            flow: FlowManager::new(weak.clone()),
            integrations: IntegrationRegistry::new(),
            http: HttpApp::new(),
            client: reqwest::Client::new(),
            components: DashSet::new(),
            component_config: RwLock::new(serde_json::Value::Object(Default::default())),
            tasks: Mutex::new(Vec::new()),
        });

        hass.integrations.register(Arc::new(HttpIntegration));
        hass
    }

    /// Load persisted config entries
    pub async fn async_load(&self) -> ConfigEntriesResult<()> {
        self.config_entries.load().await
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The shared outbound HTTP client
    pub fn http_client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Build the HTTP app from the routers integrations registered
    pub fn http_app(self: &Arc<Self>) -> Router {
        self.http.router(self.clone())
    }

    /// Whether a component finished setting up
    pub fn is_component_loaded(&self, domain: &str) -> bool {
        self.components.contains(domain)
    }

    pub(crate) fn mark_component_loaded(&self, domain: &str) {
        self.components.insert(domain.to_string());
    }

    /// Loaded component domains, sorted
    pub fn components(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.components.iter().map(|d| d.key().clone()).collect();
        domains.sort();
        domains
    }

    /// Store the full configuration for components set up later
    pub fn set_component_config(&self, config: serde_json::Value) {
        *self
            .component_config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    pub fn component_config(&self) -> serde_json::Value {
        self.component_config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run a future in the background; [`Self::async_block_till_done`] waits for it
    pub fn async_create_task<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Wait until no background tasks remain, including ones spawned meanwhile
    pub async fn async_block_till_done(&self) {
        loop {
            let pending = std::mem::take(
                &mut *self
                    .tasks
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            if pending.is_empty() {
                break;
            }

            debug!("Waiting for {} background tasks", pending.len());
            for result in futures::future::join_all(pending).await {
                if let Err(err) = result {
                    warn!("Background task failed: {}", err);
                }
            }
        }
    }
}
