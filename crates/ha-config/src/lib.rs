//! YAML configuration loading for Home Assistant
//!
//! This crate provides YAML configuration loading with support for
//! a subset of Home Assistant's custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! Integrations receive their configuration as JSON, so the loader also
//! offers [`to_json`] to convert a processed document.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::{load_yaml, to_json};
//!
//! let config = load_yaml("/config", "configuration.yaml")?;
//! let config = to_json(&config)?;
//! ```

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::CoreConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, to_json, YamlLoader};
pub use secrets::Secrets;

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
