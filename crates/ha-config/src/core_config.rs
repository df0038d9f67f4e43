//! Core Home Assistant configuration
//!
//! Parses the `homeassistant:` section from configuration.yaml

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// Core Home Assistant configuration from the `homeassistant:` section
///
/// Keys the host has no use for are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// URL the instance is reachable at from the internet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

impl CoreConfig {
    /// Parse core configuration from a full configuration document
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let section = match mapping.get("homeassistant") {
            Some(Value::Null) | None => return Ok(Self::default()),
            Some(section) => section.clone(),
        };

        serde_yaml::from_value(section).map_err(|e| ConfigError::InvalidValue {
            key: "homeassistant".to_string(),
            reason: e.to_string(),
        })
    }
}
