use std::sync::Arc;

use ha_config_entries::{ConfigEntry, ConfigEntryUpdate};
use ha_runtime::HomeAssistant;
use reqwest::{Method, RequestBuilder};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{OAuth2Error, OAuth2Result};
use crate::implementation::OAuth2Implementation;
use crate::token::{now, OAuth2Token};

/// Authenticated access on behalf of a config entry
///
/// The token lives in the entry's `token` data; refreshed tokens are written
/// back to the entry.
pub struct OAuth2Session {
    hass: Arc<HomeAssistant>,
    entry_id: String,
    implementation: Arc<dyn OAuth2Implementation>,
    refresh_lock: Mutex<()>,
}

impl OAuth2Session {
    pub fn new(
        hass: Arc<HomeAssistant>,
        entry: &ConfigEntry,
        implementation: Arc<dyn OAuth2Implementation>,
    ) -> Self {
        Self {
            hass,
            entry_id: entry.entry_id.clone(),
            implementation,
            refresh_lock: Mutex::new(()),
        }
    }

    fn entry(&self) -> OAuth2Result<ConfigEntry> {
        self.hass
            .config_entries
            .get(&self.entry_id)
            .ok_or_else(|| OAuth2Error::MissingToken(self.entry_id.clone()))
    }

    /// Current token of the entry
    pub fn token(&self) -> OAuth2Result<OAuth2Token> {
        let entry = self.entry()?;
        entry
            .data
            .get("token")
            .and_then(|token| serde_json::from_value(token.clone()).ok())
            .ok_or_else(|| OAuth2Error::MissingToken(self.entry_id.clone()))
    }

    /// Whether the current token has not expired yet
    pub fn valid_token(&self) -> bool {
        self.token().map_or(false, |token| token.is_valid_at(now()))
    }

    /// Refresh the token if it expired, persisting the new one
    pub async fn async_ensure_token_valid(&self) -> OAuth2Result<OAuth2Token> {
        let _guard = self.refresh_lock.lock().await;

        let token = self.token()?;
        if token.is_valid_at(now()) {
            return Ok(token);
        }

        debug!("Refreshing token for entry {}", self.entry_id);
        let new_token = self
            .implementation
            .async_refresh_token(&self.hass, &token)
            .await?;

        let mut data = self.entry()?.data;
        data.insert("token".to_string(), new_token.to_value());
        self.hass
            .config_entries
            .update(&self.entry_id, ConfigEntryUpdate::new().data(data))
            .await?;
        Ok(new_token)
    }

    /// Start a request carrying a valid bearer token
    pub async fn async_request(&self, method: Method, url: &str) -> OAuth2Result<RequestBuilder> {
        let token = self.async_ensure_token_valid().await?;
        Ok(self
            .hass
            .http_client()
            .request(method, url)
            .bearer_auth(token.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::LocalOAuth2Implementation;
    use ha_config::CoreConfig;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer, expires_at: f64) -> (TempDir, OAuth2Session) {
        let dir = TempDir::new().unwrap();
        let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
        let implementation = Arc::new(LocalOAuth2Implementation::new(
            "test",
            "1234",
            "5678",
            format!("{}/authorize", server.uri()),
            format!("{}/token", server.uri()),
        ));

        let mut data = HashMap::new();
        data.insert("auth_implementation".to_string(), json!("test"));
        data.insert(
            "token".to_string(),
            json!({
                "access_token": "old-access",
                "refresh_token": "refresh",
                "expires_in": 60,
                "expires_at": expires_at
            }),
        );
        let entry = hass
            .config_entries
            .add(ConfigEntry::new("test", "Test").with_data(data))
            .await
            .unwrap();

        (dir, OAuth2Session::new(hass, &entry, implementation))
    }

    #[tokio::test]
    async fn test_valid_token_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, session) = setup(&server, now() + 3600.0).await;
        assert!(session.valid_token());

        let response = session
            .async_request(Method::GET, &format!("{}/api", server.uri()))
            .await
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": 60
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header("authorization", "Bearer new-access"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, session) = setup(&server, now() - 10.0).await;
        assert!(!session.valid_token());

        session
            .async_request(Method::GET, &format!("{}/api", server.uri()))
            .await
            .unwrap()
            .send()
            .await
            .unwrap();

        let token = session.token().unwrap();
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert!(session.valid_token());
    }
}
