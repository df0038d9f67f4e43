//! Config Entry types
//!
//! A ConfigEntry represents a single instance of an integration's configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::state_machine::InvalidTransition;

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Initial state, not yet set up
    #[default]
    NotLoaded,
    /// Currently being configured (non-recoverable)
    SetupInProgress,
    /// Successfully set up (recoverable)
    Loaded,
    /// Setup failed (recoverable)
    SetupError,
    /// Waiting to retry setup (recoverable)
    SetupRetry,
    /// Version migration failed (not recoverable)
    MigrationError,
    /// Currently unloading (non-recoverable)
    UnloadInProgress,
    /// Unload failed (not recoverable)
    FailedUnload,
}

/// Source of the config entry
///
/// The source doubles as the name of the first flow step that runs for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Configured via UI/API
    #[default]
    User,
    /// Imported from YAML config
    Import,
    /// Home Assistant add-on discovered by the supervisor
    Hassio,
    /// Generic discovery
    Discovery,
    /// mDNS/Bonjour discovery
    Zeroconf,
    /// UPnP/SSDP discovery
    Ssdp,
    /// Re-authentication flow
    Reauth,
    /// User hiding a discovery
    Ignore,
}

impl ConfigEntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigEntrySource::User => "user",
            ConfigEntrySource::Import => "import",
            ConfigEntrySource::Hassio => "hassio",
            ConfigEntrySource::Discovery => "discovery",
            ConfigEntrySource::Zeroconf => "zeroconf",
            ConfigEntrySource::Ssdp => "ssdp",
            ConfigEntrySource::Reauth => "reauth",
            ConfigEntrySource::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ConfigEntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason an entry was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryDisabledBy {
    /// Disabled by the user
    User,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g., "almond")
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Immutable configuration data
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    /// Major schema version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Minor schema version
    #[serde(default = "default_version")]
    pub minor_version: u32,

    /// Origin type
    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Human-readable explanation for failed states
    #[serde(skip, default)]
    pub reason: Option<String>,

    /// What disabled this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<ConfigEntryDisabledBy>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    /// Create a new config entry
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            minor_version: 1,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Set entry data
    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    /// Set source
    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    /// Set version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// String value from `data`, if present
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Check if entry is disabled
    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// Check if entry is loaded
    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Attempt to transition to a new state with validation.
    ///
    /// On success, updates the state and reason fields.
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.try_transition(new_state)?;
        self.reason = reason;
        Ok(())
    }
}

/// Update data for a config entry
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub data: Option<HashMap<String, serde_json::Value>>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new("almond", "Configuration.yaml");
        assert_eq!(entry.domain, "almond");
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert_eq!(entry.source, ConfigEntrySource::User);
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_data_str() {
        let entry = ConfigEntry::new("almond", "Almond").with_data(HashMap::from([
            ("type".to_string(), json!("local")),
            ("port".to_string(), json!(3000)),
        ]));
        assert_eq!(entry.data_str("type"), Some("local"));
        assert_eq!(entry.data_str("port"), None);
        assert_eq!(entry.data_str("host"), None);
    }

    #[test]
    fn test_source_serializes_as_step_name() {
        assert_eq!(
            serde_json::to_value(ConfigEntrySource::Hassio).unwrap(),
            json!("hassio")
        );
        assert_eq!(ConfigEntrySource::Import.to_string(), "import");
    }

    #[test]
    fn test_try_set_state_rejects_jump() {
        let mut entry = ConfigEntry::new("almond", "Almond");
        assert!(entry.try_set_state(ConfigEntryState::Loaded, None).is_err());
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);

        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupError, Some("boom".into()))
            .unwrap();
        assert_eq!(entry.reason.as_deref(), Some("boom"));
    }

    #[test]
    fn test_runtime_state_not_persisted() {
        let mut entry = ConfigEntry::new("almond", "Almond").with_source(ConfigEntrySource::Import);
        entry.state = ConfigEntryState::Loaded;

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: ConfigEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert_eq!(parsed.source, ConfigEntrySource::Import);
        assert_eq!(parsed.entry_id, entry.entry_id);
    }
}
