//! Data entry flow results
//!
//! The shape every flow step returns, whatever the flow is for.

use ha_config_entries::ConfigEntriesError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// What a flow step asks of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    /// Show a form and wait for input
    Form,
    /// The flow finished and produced an entry
    CreateEntry,
    /// The flow finished without producing anything
    Abort,
    /// The user has to act outside the host (e.g. authorize with a third party)
    #[serde(rename = "external")]
    ExternalStep,
    /// The external action is done; configure again to continue
    #[serde(rename = "external_done")]
    ExternalStepDone,
}

impl FlowResultType {
    /// Results that keep the flow open
    pub fn keeps_flow_open(&self) -> bool {
        matches!(
            self,
            FlowResultType::Form | FlowResultType::ExternalStep | FlowResultType::ExternalStepDone
        )
    }
}

/// Form field schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    /// Allowed values, for selection fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormField {
    pub fn required(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: true,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

/// Result of a flow step
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Integration domain running the flow
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Form schema, empty when the step takes no input
    pub data_schema: Vec<FormField>,
    pub errors: Option<HashMap<String, String>>,
    pub description_placeholders: Option<HashMap<String, String>>,
    /// Entry title (create_entry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Entry data (create_entry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    /// Abort reason (abort)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Where to send the user (external)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Entry version (create_entry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// ID of the created config entry, set once the entry exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl FlowResult {
    pub fn new(
        flow_id: impl Into<String>,
        handler: impl Into<String>,
        result_type: FlowResultType,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            handler: handler.into(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            description_placeholders: None,
            title: None,
            data: None,
            reason: None,
            url: None,
            version: None,
            result: None,
        }
    }

    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_schema(mut self, schema: Vec<FormField>) -> Self {
        self.data_schema = schema;
        self
    }

    pub fn with_placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.description_placeholders
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Check submitted input against this step's form schema
    pub fn validate_input(&self, input: &serde_json::Value) -> Result<(), FlowError> {
        for field in &self.data_schema {
            let value = input.get(&field.name);
            if field.required && value.map_or(true, |v| v.is_null()) {
                return Err(FlowError::InvalidInput(format!(
                    "required key not provided: {}",
                    field.name
                )));
            }
            if let (Some(value), false) = (value, field.options.is_empty()) {
                let allowed = value
                    .as_str()
                    .map_or(false, |v| field.options.iter().any(|o| o == v));
                if !allowed {
                    return Err(FlowError::InvalidInput(format!(
                        "value must be one of {:?} for {}",
                        field.options, field.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Errors raised while driving a flow
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No config flow registered for {0}")]
    UnknownHandler(String),

    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Handler {handler} doesn't support step {step_id}")]
    UnknownStep { handler: String, step_id: String },

    #[error("Invalid flow input: {0}")]
    InvalidInput(String),

    #[error("External step can only transition to external step or external step done")]
    InvalidExternalTransition,

    #[error("Home Assistant instance is gone")]
    NotRunning,

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),

    /// An error raised by the flow handler itself (network, token exchange, ...)
    #[error("Flow step failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FlowError {
    pub fn handler(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        FlowError::Handler(Box::new(err))
    }
}

pub type FlowStepResult = Result<FlowResult, FlowError>;
