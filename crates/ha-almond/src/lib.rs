//! Almond integration
//!
//! Almond is a virtual assistant reachable either as a local server (often
//! the Hass.io add-on) or as the hosted web service behind OAuth2. Entries
//! come from three places:
//!
//! - `almond:` in `configuration.yaml` with `type: local` imports an entry
//!   once the server answers
//! - Hass.io discovery of the add-on, confirmed by the user
//! - the user flow, which authorizes against the web service when
//!   `type: oauth2` credentials are configured

mod api;
mod config;
mod config_flow;
mod integration;

pub use api::{AlmondApi, AlmondApiError, AlmondData};
pub use config::AlmondConfig;
pub use config_flow::{verify_local_connection, AlmondFlowHandler};
pub use integration::Almond;

pub const DOMAIN: &str = "almond";

pub const TYPE_LOCAL: &str = "local";
pub const TYPE_OAUTH2: &str = "oauth2";

pub const DEFAULT_OAUTH2_HOST: &str = "https://almond.stanford.edu";

/// Scopes requested when authorizing against the web service
pub const OAUTH2_SCOPE: &str = "profile user-read user-read-results user-exec-command";
