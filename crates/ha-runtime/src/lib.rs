//! Home Assistant host runtime
//!
//! Provides the pieces integrations are written against:
//!
//! - [`HomeAssistant`] - the instance: config entries, event bus, typed
//!   data store, background task tracking and the shared HTTP client
//! - [`FlowManager`] / [`ConfigFlow`] - multi-step config flows that end in
//!   a config entry or an abort
//! - [`Integration`] / [`async_setup_component`] - integration registry and
//!   dependency-aware component setup
//! - [`HttpApp`] - axum routers contributed by integrations, and the builtin
//!   `http` integration that owns the instance's base URL

pub mod bus;
pub mod config_flow;
pub mod data;
pub mod data_entry_flow;
pub mod hass;
pub mod http;
pub mod integration;
pub mod setup;

pub use bus::{Event, EventBus, EVENT_DATA_ENTRY_FLOW_PROGRESSED};
pub use config_flow::{ConfigFlow, FlowContext, FlowManager, FlowProgress};
pub use data::HassData;
pub use data_entry_flow::{FlowError, FlowResult, FlowResultType, FlowStepResult, FormField};
pub use hass::HomeAssistant;
pub use http::{HttpApp, HttpConfig, HttpIntegration};
pub use integration::{Integration, IntegrationRegistry};
pub use setup::{
    async_remove_entry, async_setup_component, async_setup_entry, async_unload_entry, SetupError,
};

// Re-exported so integrations need not depend on ha-config-entries directly
pub use ha_config_entries::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
