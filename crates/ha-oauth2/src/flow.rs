//! Reusable OAuth2 config flow steps
//!
//! A config flow keeps an [`OAuth2Flow`] and routes the `user`,
//! `pick_implementation`, `auth` and `creation` steps to it, adding its own
//! checks around them.

use std::sync::Arc;
use std::time::Duration;

use ha_runtime::{FlowContext, FlowError, FlowStepResult, FormField};
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::implementation::OAuth2Implementation;
use crate::query::update_query;
use crate::registry::async_get_implementations;
use crate::token::now;

/// How long generating the authorize URL may take
pub const AUTHORIZE_URL_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth2 state of one config flow
pub struct OAuth2Flow {
    domain: String,
    extra_authorize_data: Vec<(String, String)>,
    flow_impl: Option<Arc<dyn OAuth2Implementation>>,
    external_data: Option<Value>,
    authorize_timeout: Duration,
}

impl OAuth2Flow {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            extra_authorize_data: Vec::new(),
            flow_impl: None,
            external_data: None,
            authorize_timeout: AUTHORIZE_URL_TIMEOUT,
        }
    }

    /// Extra query parameters appended to the authorize URL
    pub fn with_extra_authorize_data(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra_authorize_data.push((key.into(), value.into()));
        self
    }

    pub fn with_authorize_timeout(mut self, authorize_timeout: Duration) -> Self {
        self.authorize_timeout = authorize_timeout;
        self
    }

    /// The implementation picked for this flow
    pub fn flow_impl(&self) -> Option<&Arc<dyn OAuth2Implementation>> {
        self.flow_impl.as_ref()
    }

    fn picked(&self, ctx: &FlowContext) -> Result<Arc<dyn OAuth2Implementation>, FlowError> {
        self.flow_impl.clone().ok_or_else(|| FlowError::UnknownStep {
            handler: ctx.handler.clone(),
            step_id: "auth".to_string(),
        })
    }

    /// Run one of the OAuth2 steps
    ///
    /// `user` is an alias for `pick_implementation`. `creation` finishes the
    /// flow with the implementation's name as the entry title.
    pub async fn async_step(
        &mut self,
        ctx: &FlowContext,
        step_id: &str,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        match step_id {
            "user" | "pick_implementation" => {
                self.async_step_pick_implementation(ctx, user_input).await
            }
            "auth" => self.async_step_auth(ctx, user_input).await,
            "creation" => self.async_step_creation(ctx).await,
            other => Err(FlowError::UnknownStep {
                handler: ctx.handler.clone(),
                step_id: other.to_string(),
            }),
        }
    }

    pub async fn async_step_pick_implementation(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        let implementations = async_get_implementations(&ctx.hass, &self.domain);

        if let Some(input) = user_input {
            let key = input
                .get("implementation")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let picked = implementations
                .get(key)
                .cloned()
                .ok_or_else(|| FlowError::InvalidInput(format!("unknown implementation {}", key)))?;
            self.flow_impl = Some(picked);
            return self.async_step_auth(ctx, None).await;
        }

        match implementations.len() {
            0 => Ok(ctx.abort("missing_configuration")),
            1 => {
                self.flow_impl = implementations.values().next().cloned();
                self.async_step_auth(ctx, None).await
            }
            _ => {
                let mut result = ctx.show_form(
                    "pick_implementation",
                    vec![FormField::required("implementation", "select")
                        .with_options(implementations.keys().cloned().collect())],
                );
                for implementation in implementations.values() {
                    result = result.with_placeholder(implementation.domain(), implementation.name());
                }
                Ok(result)
            }
        }
    }

    /// Send the user to the authorize URL, or take the code they came back with
    pub async fn async_step_auth(
        &mut self,
        ctx: &FlowContext,
        user_input: Option<Value>,
    ) -> FlowStepResult {
        if let Some(input) = user_input {
            self.external_data = Some(input);
            return Ok(ctx.external_step_done("creation"));
        }

        let flow_impl = self.picked(ctx)?;
        let url = match timeout(
            self.authorize_timeout,
            flow_impl.async_generate_authorize_url(&ctx.hass, &ctx.flow_id),
        )
        .await
        {
            Ok(url) => url?,
            Err(_) => {
                warn!("Timed out generating authorize URL for {}", ctx.handler);
                return Ok(ctx.abort("authorize_url_timeout"));
            }
        };

        let url = update_query(&url, &self.extra_authorize_data);
        Ok(ctx.external_step("auth", url))
    }

    /// Exchange the external data for a token
    ///
    /// Returns the entry data: `auth_implementation` and `token`.
    pub async fn async_resolve_token(
        &mut self,
        ctx: &FlowContext,
    ) -> Result<Map<String, Value>, FlowError> {
        let flow_impl = self.picked(ctx)?;
        let external_data = self.external_data.take().unwrap_or(Value::Null);

        let mut token = flow_impl
            .async_resolve_external_data(&ctx.hass, &external_data)
            .await?;
        token.stamp_expiry(now());
        info!("Successfully authenticated {}", ctx.handler);

        let mut data = Map::new();
        data.insert("auth_implementation".into(), json!(flow_impl.domain()));
        data.insert("token".into(), token.to_value());
        Ok(data)
    }

    pub async fn async_step_creation(&mut self, ctx: &FlowContext) -> FlowStepResult {
        let data = self.async_resolve_token(ctx).await?;
        let title = self.picked(ctx)?.name().to_string();
        Ok(ctx.create_entry(title, data))
    }
}
