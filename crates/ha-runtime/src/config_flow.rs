//! Config flows
//!
//! A config flow is a small state machine owned by an integration. The
//! [`FlowManager`] creates one per `async_init`, feeds it input on each
//! `async_configure` and turns a finished flow into a config entry.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::{ConfigEntry, ConfigEntrySource};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EVENT_DATA_ENTRY_FLOW_PROGRESSED;
use crate::data_entry_flow::{FlowError, FlowResult, FlowResultType, FlowStepResult, FormField};
use crate::hass::HomeAssistant;
use crate::setup;

/// A config flow handler
///
/// `async_step` dispatches on the step name. The first step of a flow is
/// named after its source (`user`, `import`, `hassio`, ...).
#[async_trait]
pub trait ConfigFlow: Send {
    /// Version stamped on entries this flow creates
    fn version(&self) -> u32 {
        1
    }

    async fn async_step(
        &mut self,
        ctx: &FlowContext,
        step_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> FlowStepResult;
}

/// What a flow step knows about the flow it runs in
#[derive(Clone)]
pub struct FlowContext {
    pub hass: Arc<HomeAssistant>,
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    pub source: ConfigEntrySource,
}

impl FlowContext {
    /// Context for a flow driven directly rather than through the manager
    pub fn new(
        hass: Arc<HomeAssistant>,
        handler: impl Into<String>,
        source: ConfigEntrySource,
    ) -> Self {
        Self {
            hass,
            flow_id: new_flow_id(),
            handler: handler.into(),
            source,
        }
    }

    /// Config entries that already exist for this flow's domain
    pub fn current_entries(&self) -> Vec<ConfigEntry> {
        self.hass.config_entries.get_by_domain(&self.handler)
    }

    fn result(&self, result_type: FlowResultType) -> FlowResult {
        FlowResult::new(&self.flow_id, &self.handler, result_type)
    }

    /// Show a form for `step_id`
    pub fn show_form(&self, step_id: &str, schema: Vec<FormField>) -> FlowResult {
        self.result(FlowResultType::Form)
            .with_step_id(step_id)
            .with_schema(schema)
    }

    /// Finish the flow without creating anything
    pub fn abort(&self, reason: &str) -> FlowResult {
        let mut result = self.result(FlowResultType::Abort);
        result.reason = Some(reason.to_string());
        result
    }

    /// Finish the flow by creating a config entry
    pub fn create_entry(
        &self,
        title: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> FlowResult {
        let mut result = self.result(FlowResultType::CreateEntry);
        result.title = Some(title.into());
        result.data = Some(data);
        result
    }

    /// Send the user to `url`; the flow resumes on the next configure
    pub fn external_step(&self, step_id: &str, url: impl Into<String>) -> FlowResult {
        let mut result = self.result(FlowResultType::ExternalStep).with_step_id(step_id);
        result.url = Some(url.into());
        result
    }

    /// The external action is done; the next configure runs `next_step_id`
    pub fn external_step_done(&self, next_step_id: &str) -> FlowResult {
        self.result(FlowResultType::ExternalStepDone)
            .with_step_id(next_step_id)
    }
}

fn new_flow_id() -> String {
    Uuid::new_v4().simple().to_string()
}

struct ActiveFlow {
    flow: Box<dyn ConfigFlow>,
    flow_id: String,
    handler: String,
    source: ConfigEntrySource,
    /// Last result that kept the flow open
    cur_step: Option<FlowResult>,
}

/// Summary of an open flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowProgress {
    pub flow_id: String,
    pub handler: String,
    pub source: ConfigEntrySource,
    pub step_id: Option<String>,
}

/// Manages open config flows (`hass.config_entries.flow`)
pub struct FlowManager {
    hass: Weak<HomeAssistant>,
    progress: DashMap<String, Arc<Mutex<ActiveFlow>>>,
}

impl FlowManager {
    pub(crate) fn new(hass: Weak<HomeAssistant>) -> Self {
        Self {
            hass,
            progress: DashMap::new(),
        }
    }

    fn hass(&self) -> Result<Arc<HomeAssistant>, FlowError> {
        self.hass.upgrade().ok_or(FlowError::NotRunning)
    }

    /// Start a flow for `handler` and run its first step
    pub async fn async_init(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        data: Option<serde_json::Value>,
    ) -> FlowStepResult {
        let hass = self.hass()?;
        let flow = hass
            .integrations
            .get(handler)
            .and_then(|integration| integration.config_flow())
            .ok_or_else(|| FlowError::UnknownHandler(handler.to_string()))?;

        let flow_id = new_flow_id();
        debug!("Starting {} flow {} for {}", source, flow_id, handler);

        let active = Arc::new(Mutex::new(ActiveFlow {
            flow,
            flow_id: flow_id.clone(),
            handler: handler.to_string(),
            source,
            cur_step: None,
        }));
        self.progress.insert(flow_id, active.clone());

        let mut active = active.lock().await;
        self.handle_step(&hass, &mut active, source.as_str(), data)
            .await
    }

    /// Continue a flow with input for its current step
    pub async fn async_configure(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> FlowStepResult {
        let hass = self.hass()?;
        let active = self
            .progress
            .get(flow_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let mut active = active.lock().await;
        // The flow may have finished while this call waited for the lock
        if !self.progress.contains_key(flow_id) {
            return Err(FlowError::UnknownFlow(flow_id.to_string()));
        }

        let cur_step = active
            .cur_step
            .clone()
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        if let Some(ref input) = user_input {
            cur_step.validate_input(input)?;
        }

        let step_id = cur_step.step_id.clone().unwrap_or_default();
        let result = self
            .handle_step(&hass, &mut active, &step_id, user_input)
            .await?;

        if cur_step.result_type == FlowResultType::ExternalStep {
            if !matches!(
                result.result_type,
                FlowResultType::ExternalStep | FlowResultType::ExternalStepDone
            ) {
                return Err(FlowError::InvalidExternalTransition);
            }
            if result.step_id != cur_step.step_id {
                hass.bus.fire(
                    EVENT_DATA_ENTRY_FLOW_PROGRESSED,
                    json!({"handler": active.handler, "flow_id": flow_id, "refresh": true}),
                );
            }
        }

        Ok(result)
    }

    /// Open flows
    pub fn async_progress(&self) -> Vec<FlowProgress> {
        self.progress
            .iter()
            .filter_map(|entry| {
                // Flows busy running a step are skipped rather than waited on
                let active = entry.value().try_lock().ok()?;
                Some(FlowProgress {
                    flow_id: active.flow_id.clone(),
                    handler: active.handler.clone(),
                    source: active.source,
                    step_id: active.cur_step.as_ref().and_then(|s| s.step_id.clone()),
                })
            })
            .collect()
    }

    /// Drop an open flow
    pub fn async_abort(&self, flow_id: &str) -> Result<(), FlowError> {
        self.progress
            .remove(flow_id)
            .map(|_| debug!("Aborted flow {}", flow_id))
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }

    async fn handle_step(
        &self,
        hass: &Arc<HomeAssistant>,
        active: &mut ActiveFlow,
        step_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> FlowStepResult {
        let ctx = FlowContext {
            hass: hass.clone(),
            flow_id: active.flow_id.clone(),
            handler: active.handler.clone(),
            source: active.source,
        };

        let result = match active.flow.async_step(&ctx, step_id, user_input).await {
            Ok(result) => result,
            Err(err) => {
                if matches!(err, FlowError::UnknownStep { .. }) {
                    self.progress.remove(&active.flow_id);
                }
                return Err(err);
            }
        };

        if result.result_type.keeps_flow_open() {
            active.cur_step = Some(result.clone());
            return Ok(result);
        }

        self.progress.remove(&active.flow_id);

        if result.result_type == FlowResultType::Abort {
            debug!(
                "Flow {} for {} aborted: {}",
                active.flow_id,
                active.handler,
                result.reason.as_deref().unwrap_or_default()
            );
            return Ok(result);
        }

        self.finish_flow(hass, active, result).await
    }

    /// Turn a create_entry result into a stored, set up config entry
    async fn finish_flow(
        &self,
        hass: &Arc<HomeAssistant>,
        active: &mut ActiveFlow,
        mut result: FlowResult,
    ) -> FlowStepResult {
        let title = result.title.clone().unwrap_or_default();
        let data = result
            .data
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let version = active.flow.version();
        let entry = ConfigEntry::new(&active.handler, title)
            .with_data(data)
            .with_source(active.source)
            .with_version(version);
        let entry = hass.config_entries.add(entry).await?;
        info!(
            "Flow {} created config entry {} for {}",
            active.flow_id, entry.entry_id, active.handler
        );

        match setup::async_setup_entry(hass, &entry.entry_id).await {
            Ok(true) => {}
            Ok(false) => warn!("Config entry {} did not set up", entry.entry_id),
            Err(err) => warn!("Error setting up config entry {}: {}", entry.entry_id, err),
        }

        result.version = Some(version);
        result.result = Some(entry.entry_id);
        Ok(result)
    }
}
