//! Almond web API client

use std::sync::Arc;

use dashmap::DashMap;
use ha_oauth2::{OAuth2Error, OAuth2Session};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AlmondApiError {
    #[error("Almond request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Almond did not answer in time")]
    Timeout,

    #[error("Almond authentication failed: {0}")]
    Auth(#[from] OAuth2Error),
}

impl AlmondApiError {
    /// Whether the server could not be reached at all
    pub fn is_connection_error(&self) -> bool {
        matches!(self, AlmondApiError::Timeout | AlmondApiError::Request(_))
    }
}

enum AlmondAuth {
    Local,
    OAuth2(Arc<OAuth2Session>),
}

/// Client for one Almond server
pub struct AlmondApi {
    client: reqwest::Client,
    host: String,
    auth: AlmondAuth,
}

impl AlmondApi {
    /// A server that needs no authentication
    pub fn local(client: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            auth: AlmondAuth::Local,
        }
    }

    /// The web service, authenticated by an OAuth2 session
    pub fn oauth2(
        client: reqwest::Client,
        host: impl Into<String>,
        session: Arc<OAuth2Session>,
    ) -> Self {
        Self {
            client,
            host: host.into(),
            auth: AlmondAuth::OAuth2(session),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AlmondApiError> {
        let url = format!("{}{}", self.host.trim_end_matches('/'), path);
        debug!("Almond request {} {}", method, url);
        Ok(match &self.auth {
            AlmondAuth::Local => self.client.request(method, url),
            AlmondAuth::OAuth2(session) => session.async_request(method, &url).await?,
        })
    }

    /// Installed apps
    pub async fn async_list_apps(&self) -> Result<Value, AlmondApiError> {
        let response = self
            .request(Method::GET, "/api/apps/list")
            .await?
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Send a text command, optionally continuing a conversation
    pub async fn async_converse_text(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<Value, AlmondApiError> {
        let response = self
            .request(Method::POST, "/api/converse")
            .await?
            .json(&json!({
                "command": {"type": "command", "text": text},
                "conversationId": conversation_id,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Clients of the loaded entries, by entry id
#[derive(Default)]
pub struct AlmondData {
    pub apis: DashMap<String, Arc<AlmondApi>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_apps() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/apps/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uniqueId": "app"}])))
            .expect(1)
            .mount(&server)
            .await;

        let api = AlmondApi::local(reqwest::Client::new(), format!("{}/", server.uri()));
        let apps = api.async_list_apps().await.unwrap();
        assert_eq!(apps[0]["uniqueId"], "app");
    }

    #[tokio::test]
    async fn test_converse_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/converse"))
            .and(body_json(json!({
                "command": {"type": "command", "text": "hello"},
                "conversationId": "conv-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"type": "text", "text": "Hi!"}],
                "conversationId": "conv-1"
            })))
            .mount(&server)
            .await;

        let api = AlmondApi::local(reqwest::Client::new(), server.uri());
        let response = api.async_converse_text("hello", Some("conv-1")).await.unwrap();
        assert_eq!(response["messages"][0]["text"], "Hi!");
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let api = AlmondApi::local(reqwest::Client::new(), server.uri());
        let err = api.async_list_apps().await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
