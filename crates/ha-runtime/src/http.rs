//! HTTP app shared by integrations
//!
//! Integrations contribute axum routers during setup; the server merges them
//! into one app with the instance as shared state.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use tracing::{debug, info};

use crate::hass::HomeAssistant;
use crate::integration::Integration;
use crate::setup::SetupError;

pub const DOMAIN: &str = "http";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8123;

/// Router type integrations register
pub type HassRouter = Router<Arc<HomeAssistant>>;

/// `http:` section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Externally reachable URL of this instance
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            server_host: default_server_host(),
            server_port: default_server_port(),
        }
    }
}

impl HttpConfig {
    /// Parse the `http` key of the full configuration
    pub fn from_config(config: &serde_json::Value) -> Result<Self, SetupError> {
        match config.get(DOMAIN) {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(section) => {
                serde_json::from_value(section.clone()).map_err(|e| SetupError::InvalidConfig {
                    domain: DOMAIN.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Routers and base URL of the instance
pub struct HttpApp {
    base_url: RwLock<String>,
    config: RwLock<HttpConfig>,
    routers: Mutex<Vec<HassRouter>>,
}

impl Default for HttpApp {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpApp {
    pub fn new() -> Self {
        Self {
            base_url: RwLock::new(format!("http://localhost:{}", DEFAULT_SERVER_PORT)),
            config: RwLock::new(HttpConfig::default()),
            routers: Mutex::new(Vec::new()),
        }
    }

    /// URL the instance is reachable at, without a trailing slash
    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_base_url(&self, url: &str) {
        let url = url.trim_end_matches('/').to_string();
        debug!("HTTP base URL set to {}", url);
        *self
            .base_url
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = url;
    }

    pub fn config(&self) -> HttpConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Add a router to the app
    ///
    /// Routers registered after [`HttpApp::router`] was called only show up in
    /// apps built later.
    pub fn register_router(&self, router: HassRouter) {
        self.routers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(router);
    }

    /// Build the app from every registered router
    pub fn router(&self, hass: Arc<HomeAssistant>) -> Router {
        let routers = self
            .routers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        routers
            .into_iter()
            .fold(Router::new().route("/api/", get(api_status)), |app, r| {
                app.merge(r)
            })
            .with_state(hass)
    }
}

/// GET /api/ - Returns API status
async fn api_status() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "API running." }))
}

/// Builtin `http` integration, owns the base URL
pub struct HttpIntegration;

#[async_trait]
impl Integration for HttpIntegration {
    fn domain(&self) -> &'static str {
        DOMAIN
    }

    async fn async_setup(
        &self,
        hass: &Arc<HomeAssistant>,
        config: &serde_json::Value,
    ) -> Result<bool, SetupError> {
        let http_config = HttpConfig::from_config(config)?;

        let base_url = http_config
            .base_url
            .clone()
            .or_else(|| hass.core_config.external_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}", http_config.server_port));
        hass.http.set_base_url(&base_url);

        info!("HTTP configured, base URL {}", hass.http.base_url());
        *hass
            .http
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = http_config;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::async_setup_component;
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{Request, StatusCode};
    use ha_config::CoreConfig;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::from_config(&json!({})).unwrap();
        assert_eq!(config, HttpConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8123");

        let config = HttpConfig::from_config(&json!({"http": {"server_port": 9000}})).unwrap();
        assert_eq!(config.server_port, 9000);
        assert!(HttpConfig::from_config(&json!({"http": {"server_port": "x"}})).is_err());
    }

    #[tokio::test]
    async fn test_base_url_from_config() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        assert_eq!(hass.http.base_url(), "http://localhost:8123");

        let config = json!({"http": {"base_url": "https://example.com/"}});
        assert!(async_setup_component(&hass, "http", &config).await);
        assert_eq!(hass.http.base_url(), "https://example.com");
    }

    #[tokio::test]
    async fn test_base_url_falls_back_to_external_url() {
        let dir = TempDir::new().unwrap();
        let core_config = CoreConfig {
            external_url: Some("https://home.example.com".into()),
        };
        let hass = HomeAssistant::new(dir.path(), core_config);

        assert!(async_setup_component(&hass, "http", &json!({})).await);
        assert_eq!(hass.http.base_url(), "https://home.example.com");
    }

    #[tokio::test]
    async fn test_registered_routers_share_state() {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());

        hass.http.register_router(Router::new().route(
            "/ping",
            get(|State(hass): State<Arc<HomeAssistant>>| async move { hass.http.base_url() }),
        ));

        let app = hass.http_app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"http://localhost:8123");

        let response = app
            .oneshot(Request::builder().uri("/api/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
