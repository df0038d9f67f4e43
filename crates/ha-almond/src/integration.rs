use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_oauth2::{
    async_get_config_entry_implementation, async_register_implementation,
    LocalOAuth2Implementation, OAuth2Session,
};
use ha_runtime::{ConfigEntrySource, ConfigFlow, HomeAssistant, Integration, SetupError};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{AlmondApi, AlmondData};
use crate::config::AlmondConfig;
use crate::config_flow::AlmondFlowHandler;
use crate::{DOMAIN, TYPE_LOCAL, TYPE_OAUTH2};

/// The Almond integration
pub struct Almond;

#[async_trait]
impl Integration for Almond {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["http"]
    }

    async fn async_setup(
        &self,
        hass: &Arc<HomeAssistant>,
        config: &serde_json::Value,
    ) -> Result<bool, SetupError> {
        let Some(conf) = AlmondConfig::from_config(config)? else {
            return Ok(true);
        };

        match conf {
            AlmondConfig::OAuth2 {
                host,
                client_id,
                client_secret,
            } => {
                let host = host.trim_end_matches('/');
                async_register_implementation(
                    hass,
                    DOMAIN,
                    Arc::new(LocalOAuth2Implementation::new(
                        DOMAIN,
                        client_id,
                        client_secret,
                        format!("{}/me/api/oauth2/authorize", host),
                        format!("{}/me/api/oauth2/token", host),
                    )),
                );
            }
            AlmondConfig::Local { host } => {
                if hass.config_entries.has_domain(DOMAIN) {
                    debug!("Almond already configured, skipping import");
                    return Ok(true);
                }

                let task_hass = hass.clone();
                hass.async_create_task(async move {
                    let result = task_hass
                        .flow
                        .async_init(
                            DOMAIN,
                            ConfigEntrySource::Import,
                            Some(json!({"type": TYPE_LOCAL, "host": host})),
                        )
                        .await;
                    if let Err(err) = result {
                        warn!("Almond import failed: {}", err);
                    }
                });
            }
        }

        Ok(true)
    }

    async fn async_setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<bool, SetupError> {
        let host = entry.data_str("host").unwrap_or_default().to_string();

        let api = if entry.data_str("type") == Some(TYPE_OAUTH2) {
            let implementation = async_get_config_entry_implementation(hass, entry)
                .map_err(|e| SetupError::Failed(e.to_string()))?;
            let session = OAuth2Session::new(hass.clone(), entry, implementation);
            AlmondApi::oauth2(hass.http_client(), host, Arc::new(session))
        } else {
            AlmondApi::local(hass.http_client(), host)
        };

        info!("Almond entry {} using {}", entry.entry_id, api.host());
        hass.data
            .get_or_insert_with(AlmondData::default)
            .apis
            .insert(entry.entry_id.clone(), Arc::new(api));
        Ok(true)
    }

    async fn async_unload_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<bool, SetupError> {
        if let Some(data) = hass.data.get::<AlmondData>() {
            data.apis.remove(&entry.entry_id);
        }
        Ok(true)
    }

    fn config_flow(&self) -> Option<Box<dyn ConfigFlow>> {
        Some(Box::new(AlmondFlowHandler::new()))
    }
}
