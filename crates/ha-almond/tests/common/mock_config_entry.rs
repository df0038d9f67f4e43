//! Mock config entry for testing

use std::collections::HashMap;

use ha_runtime::{ConfigEntry, ConfigEntrySource, HomeAssistant};
use serde_json::Value;

/// A config entry added straight to an instance
#[derive(Debug, Clone)]
pub struct MockConfigEntry {
    pub domain: String,
    pub title: String,
    pub data: HashMap<String, Value>,
    pub source: ConfigEntrySource,
}

impl MockConfigEntry {
    /// Create a new mock config entry for a domain
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            title: "Mock Title".to_string(),
            data: HashMap::new(),
            source: ConfigEntrySource::User,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Add a data key
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    /// Store the entry without setting it up
    pub async fn add_to_hass(self, hass: &HomeAssistant) -> ConfigEntry {
        let entry = ConfigEntry::new(self.domain, self.title)
            .with_data(self.data)
            .with_source(self.source);
        hass.config_entries
            .add(entry)
            .await
            .expect("Failed to add mock config entry")
    }
}
