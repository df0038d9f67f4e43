use std::sync::Arc;

use async_trait::async_trait;
use ha_runtime::HomeAssistant;
use tracing::debug;

use crate::error::{OAuth2Error, OAuth2Result};
use crate::jwt::{encode_jwt, FlowState};
use crate::query::update_query;
use crate::token::{now, OAuth2Token};
use crate::view::AUTH_CALLBACK_PATH;

/// A way to obtain OAuth2 tokens for an integration
#[async_trait]
pub trait OAuth2Implementation: Send + Sync {
    /// Name shown to the user when picking an implementation
    fn name(&self) -> &str;

    /// Key the implementation is registered under
    fn domain(&self) -> &str;

    /// Whether tokens come back through the local callback view
    fn uses_callback_view(&self) -> bool {
        false
    }

    /// URL to send the user to for authorizing `flow_id`
    async fn async_generate_authorize_url(
        &self,
        hass: &Arc<HomeAssistant>,
        flow_id: &str,
    ) -> OAuth2Result<String>;

    /// Turn what the authorize redirect delivered into a token
    async fn async_resolve_external_data(
        &self,
        hass: &Arc<HomeAssistant>,
        external_data: &serde_json::Value,
    ) -> OAuth2Result<OAuth2Token>;

    /// Fetch a new token using the refresh token of `token`
    async fn async_refresh_token_request(
        &self,
        hass: &Arc<HomeAssistant>,
        token: &OAuth2Token,
    ) -> OAuth2Result<OAuth2Token>;

    /// Refresh `token` and stamp the new expiry
    async fn async_refresh_token(
        &self,
        hass: &Arc<HomeAssistant>,
        token: &OAuth2Token,
    ) -> OAuth2Result<OAuth2Token> {
        let mut new_token = self.async_refresh_token_request(hass, token).await?;
        new_token.stamp_expiry(now());
        Ok(new_token)
    }
}

/// Implementation with client credentials from the local configuration
pub struct LocalOAuth2Implementation {
    domain: String,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
}

impl LocalOAuth2Implementation {
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
        }
    }

    /// Where the provider sends the user back to
    pub fn redirect_uri(&self, hass: &HomeAssistant) -> String {
        format!("{}{}", hass.http.base_url(), AUTH_CALLBACK_PATH)
    }

    async fn token_request(
        &self,
        hass: &HomeAssistant,
        mut form: Vec<(&'static str, String)>,
    ) -> OAuth2Result<OAuth2Token> {
        form.push(("client_id", self.client_id.clone()));
        form.push(("client_secret", self.client_secret.clone()));

        debug!("Requesting token from {}", self.token_url);
        let token = hass
            .http_client()
            .post(&self.token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<OAuth2Token>()
            .await?;
        Ok(token)
    }
}

#[async_trait]
impl OAuth2Implementation for LocalOAuth2Implementation {
    fn name(&self) -> &str {
        "Configuration.yaml"
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn uses_callback_view(&self) -> bool {
        true
    }

    async fn async_generate_authorize_url(
        &self,
        hass: &Arc<HomeAssistant>,
        flow_id: &str,
    ) -> OAuth2Result<String> {
        let state = encode_jwt(
            hass,
            &FlowState {
                flow_id: flow_id.to_string(),
            },
        )?;
        let redirect_uri = self.redirect_uri(hass);

        Ok(update_query(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        ))
    }

    async fn async_resolve_external_data(
        &self,
        hass: &Arc<HomeAssistant>,
        external_data: &serde_json::Value,
    ) -> OAuth2Result<OAuth2Token> {
        let code = external_data
            .as_str()
            .ok_or_else(|| OAuth2Error::InvalidExternalData(external_data.to_string()))?;

        self.token_request(
            hass,
            vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.to_string()),
                ("redirect_uri", self.redirect_uri(hass)),
            ],
        )
        .await
    }

    async fn async_refresh_token_request(
        &self,
        hass: &Arc<HomeAssistant>,
        token: &OAuth2Token,
    ) -> OAuth2Result<OAuth2Token> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(|| OAuth2Error::MissingToken(self.domain.clone()))?;

        let new_token = self
            .token_request(
                hass,
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;
        Ok(token.merge(new_token))
    }
}
