//! Config flow for Almond

use std::time::Duration;

use async_trait::async_trait;
use ha_oauth2::OAuth2Flow;
use ha_runtime::{
    ConfigFlow, FlowContext, FlowError, FlowResultType, FlowStepResult, HomeAssistant,
};
use reqwest::Url;
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tracing::{error, warn};

use crate::api::{AlmondApi, AlmondApiError};
use crate::{DOMAIN, OAUTH2_SCOPE, TYPE_LOCAL, TYPE_OAUTH2};

/// How long the import probe waits for the server
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Check that a local Almond server answers
pub async fn verify_local_connection(
    hass: &HomeAssistant,
    host: &str,
    wait: Duration,
) -> Result<(), AlmondApiError> {
    let api = AlmondApi::local(hass.http_client(), host);
    match timeout(wait, api.async_list_apps()).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(AlmondApiError::Timeout),
    }
}

/// Handles Almond config flows
pub struct AlmondFlowHandler {
    oauth2: OAuth2Flow,
    /// Web service host, recorded once the authorize URL is known
    host: Option<String>,
    hassio_discovery: Option<Value>,
    connection_timeout: Duration,
}

impl Default for AlmondFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl AlmondFlowHandler {
    pub fn new() -> Self {
        Self {
            oauth2: OAuth2Flow::new(DOMAIN).with_extra_authorize_data("scope", OAUTH2_SCOPE),
            host: None,
            hassio_discovery: None,
            connection_timeout: CONNECTION_TIMEOUT,
        }
    }

    /// Probe timeout used by the import step
    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    fn already_setup(ctx: &FlowContext) -> bool {
        !ctx.current_entries().is_empty()
    }

    pub async fn async_step_user(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        if Self::already_setup(ctx) {
            return Ok(ctx.abort("already_setup"));
        }
        self.oauth2
            .async_step_pick_implementation(ctx, user_input)
            .await
            .map(|result| self.record_host(result))
    }

    pub async fn async_step_pick_implementation(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        self.oauth2
            .async_step_pick_implementation(ctx, user_input)
            .await
            .map(|result| self.record_host(result))
    }

    pub async fn async_step_auth(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        self.oauth2
            .async_step_auth(ctx, user_input)
            .await
            .map(|result| self.record_host(result))
    }

    /// The web service lives at `/me` on the authorize URL's origin
    fn record_host(&mut self, result: ha_runtime::FlowResult) -> ha_runtime::FlowResult {
        if result.result_type == FlowResultType::ExternalStep {
            if let Some(mut url) = result.url.as_deref().and_then(|u| Url::parse(u).ok()) {
                url.set_path("/me");
                url.set_query(None);
                url.set_fragment(None);
                self.host = Some(url.to_string());
            }
        }
        result
    }

    pub async fn async_step_creation(&mut self, ctx: &FlowContext) -> FlowStepResult {
        let data = self.oauth2.async_resolve_token(ctx).await?;
        self.async_oauth_create_entry(ctx, data)
    }

    fn async_oauth_create_entry(
        &self,
        ctx: &FlowContext,
        mut data: Map<String, Value>,
    ) -> FlowStepResult {
        let title = self
            .oauth2
            .flow_impl()
            .map(|implementation| implementation.name().to_string())
            .unwrap_or_default();

        data.insert("type".into(), json!(TYPE_OAUTH2));
        data.insert("host".into(), json!(self.host));
        Ok(ctx.create_entry(title, data))
    }

    pub async fn async_step_import(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        if Self::already_setup(ctx) {
            return Ok(ctx.abort("already_setup"));
        }

        let host = user_input
            .as_ref()
            .and_then(|input| input.get("host"))
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::InvalidInput("required key not provided: host".into()))?
            .to_string();

        if let Err(err) = verify_local_connection(&ctx.hass, &host, self.connection_timeout).await
        {
            if err.is_connection_error() {
                warn!("Unable to connect to Almond at {}: {}", host, err);
                return Ok(ctx.abort("cannot_connect"));
            }
            error!("Unexpected error verifying Almond at {}: {}", host, err);
            return Ok(ctx.abort("unknown_error"));
        }

        let mut data = Map::new();
        data.insert("type".into(), json!(TYPE_LOCAL));
        data.insert("host".into(), json!(host));
        Ok(ctx.create_entry("Configuration.yaml", data))
    }

    pub async fn async_step_hassio(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        if Self::already_setup(ctx) {
            return Ok(ctx.abort("already_setup"));
        }

        self.hassio_discovery = user_input;
        self.async_step_hassio_confirm(ctx, None).await
    }

    pub async fn async_step_hassio_confirm(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        let discovery = match &self.hassio_discovery {
            Some(discovery @ Value::Object(_)) => discovery.clone(),
            _ => {
                warn!("Hass.io confirmation without discovery info");
                return Ok(ctx.abort("no_discovery"));
            }
        };
        let field = |key: &str| match discovery.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let addon = field("addon");

        if user_input.is_none() {
            return Ok(ctx
                .show_form("hassio_confirm", Vec::new())
                .with_placeholder("addon", addon));
        }

        let mut data = Map::new();
        data.insert("is_hassio".into(), json!(true));
        data.insert("type".into(), json!(TYPE_LOCAL));
        data.insert(
            "host".into(),
            json!(format!("http://{}:{}", field("host"), field("port"))),
        );
        Ok(ctx.create_entry(addon, data))
    }
}

#[async_trait]
impl ConfigFlow for AlmondFlowHandler {
    async fn async_step(
        &mut self,
        ctx: &FlowContext,
        step_id: &str,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        match step_id {
            "user" => self.async_step_user(ctx, user_input).await,
            "pick_implementation" => self.async_step_pick_implementation(ctx, user_input).await,
            "auth" => self.async_step_auth(ctx, user_input).await,
            "creation" => self.async_step_creation(ctx).await,
            "import" => self.async_step_import(ctx, user_input).await,
            "hassio" => self.async_step_hassio(ctx, user_input).await,
            "hassio_confirm" => self.async_step_hassio_confirm(ctx, user_input).await,
            other => Err(FlowError::UnknownStep {
                handler: ctx.handler.clone(),
                step_id: other.to_string(),
            }),
        }
    }
}
