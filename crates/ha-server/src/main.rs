//! Home Assistant Rust Server
//!
//! Main entry point: loads `configuration.yaml`, sets up the configured
//! integrations and serves the HTTP app until interrupted.

use anyhow::{Context, Result};
use ha_almond::Almond;
use ha_config::{load_yaml, to_json, CoreConfig};
use ha_runtime::{async_setup_component, HomeAssistant};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Directory holding `configuration.yaml` and `.storage/`
fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HA_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Domains to set up at startup
///
/// `http` always, every configured domain with a registered integration, and
/// every domain that already has config entries.
fn domains_to_set_up(hass: &HomeAssistant, config: &serde_json::Value) -> Vec<String> {
    let mut domains = BTreeSet::from(["http".to_string()]);

    if let Some(sections) = config.as_object() {
        for domain in sections.keys() {
            if hass.integrations.get(domain).is_some() {
                domains.insert(domain.clone());
            } else if domain != "homeassistant" {
                warn!("Integration {} not found", domain);
            }
        }
    }

    for entry in hass.config_entries.iter() {
        domains.insert(entry.domain);
    }

    domains.into_iter().collect()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", err);
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!("Starting Home Assistant (Rust) in {}", config_dir.display());

    let yaml = load_yaml(&config_dir, "configuration.yaml")
        .with_context(|| format!("Unable to load configuration from {}", config_dir.display()))?;
    let core_config = CoreConfig::from_yaml(&yaml)?;
    let config = to_json(&yaml)?;

    let hass = HomeAssistant::new(&config_dir, core_config);
    hass.async_load()
        .await
        .context("Unable to load config entries")?;
    hass.set_component_config(config.clone());
    hass.integrations.register(Arc::new(Almond));

    for domain in domains_to_set_up(&hass, &config) {
        if !async_setup_component(&hass, &domain, &config).await {
            warn!("Unable to set up {}", domain);
        }
    }
    hass.async_block_till_done().await;
    info!("Home Assistant initialized: {:?}", hass.components());

    let app = hass.http_app().layer(TraceLayer::new_for_http());
    let addr = hass.http.config().bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Unable to bind {}", addr))?;
    info!("Home Assistant is running on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hass.async_block_till_done().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_runtime::ConfigEntry;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_domains_to_set_up() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        hass.integrations.register(Arc::new(Almond));

        let config = json!({"homeassistant": {"name": "Home"}, "frontend": {}});
        assert_eq!(domains_to_set_up(&hass, &config), vec!["http".to_string()]);

        hass.config_entries
            .add(ConfigEntry::new("almond", "Almond add-on"))
            .await
            .unwrap();
        assert_eq!(
            domains_to_set_up(&hass, &json!({"http": {}})),
            vec!["almond".to_string(), "http".to_string()]
        );
    }
}
