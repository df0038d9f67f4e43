use ha_runtime::SetupError;
use reqwest::Url;
use serde::Deserialize;

use crate::{DEFAULT_OAUTH2_HOST, DOMAIN};

/// `almond:` section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum AlmondConfig {
    /// A server reachable without authentication
    #[serde(rename = "local")]
    Local { host: String },
    /// The web service, through OAuth2
    #[serde(rename = "oauth2")]
    OAuth2 {
        #[serde(default = "default_oauth2_host")]
        host: String,
        client_id: String,
        client_secret: String,
    },
}

fn default_oauth2_host() -> String {
    DEFAULT_OAUTH2_HOST.to_string()
}

fn invalid(reason: impl Into<String>) -> SetupError {
    SetupError::InvalidConfig {
        domain: DOMAIN.to_string(),
        reason: reason.into(),
    }
}

impl AlmondConfig {
    /// Read the `almond` key of the full configuration, if present
    pub fn from_config(config: &serde_json::Value) -> Result<Option<Self>, SetupError> {
        let Some(section) = config.get(DOMAIN) else {
            return Ok(None);
        };

        let conf: AlmondConfig =
            serde_json::from_value(section.clone()).map_err(|e| invalid(e.to_string()))?;

        let url = Url::parse(conf.host()).map_err(|e| invalid(format!("host: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("host: unsupported scheme {}", url.scheme())));
        }

        Ok(Some(conf))
    }

    pub fn host(&self) -> &str {
        match self {
            AlmondConfig::Local { host } | AlmondConfig::OAuth2 { host, .. } => host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local() {
        let conf = AlmondConfig::from_config(&json!({
            "almond": {"type": "local", "host": "http://localhost:3000"}
        }))
        .unwrap();
        assert_eq!(
            conf,
            Some(AlmondConfig::Local {
                host: "http://localhost:3000".into()
            })
        );
    }

    #[test]
    fn test_oauth2_default_host() {
        let conf = AlmondConfig::from_config(&json!({
            "almond": {"type": "oauth2", "client_id": "1234", "client_secret": "5678"}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(conf.host(), "https://almond.stanford.edu");
    }

    #[test]
    fn test_absent() {
        assert_eq!(AlmondConfig::from_config(&json!({"http": {}})).unwrap(), None);
    }

    #[test]
    fn test_invalid() {
        for section in [
            json!({"type": "local"}),
            json!({"type": "oauth2", "client_id": "1234"}),
            json!({"type": "cloud", "host": "http://localhost:3000"}),
            json!({"type": "local", "host": "localhost:3000"}),
            json!({"type": "local", "host": "ftp://localhost"}),
        ] {
            let result = AlmondConfig::from_config(&json!({ "almond": section }));
            assert!(
                matches!(result, Err(SetupError::InvalidConfig { .. })),
                "{:?} should be rejected",
                section
            );
        }
    }
}
