use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token as returned by a token endpoint, plus the computed expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as sent by the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<f64>,
    /// Unix timestamp (seconds) the token expires at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
    /// Any other fields the endpoint sent (`token_type`, `scope`, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Current time as fractional Unix seconds
pub(crate) fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl OAuth2Token {
    /// Set `expires_at` from `expires_in`, counting from `now`
    pub fn stamp_expiry(&mut self, now: f64) {
        self.expires_at = Some(now + self.expires_in.unwrap_or_default());
    }

    /// Whether the token is still usable at `now`
    ///
    /// Tokens without a known expiry are treated as expired.
    pub fn is_valid_at(&self, now: f64) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at > now)
    }

    /// Combine a refreshed token with this one; fields of `newer` win
    pub fn merge(&self, newer: OAuth2Token) -> OAuth2Token {
        let mut extra = self.extra.clone();
        extra.extend(newer.extra);
        OAuth2Token {
            access_token: newer.access_token,
            refresh_token: newer.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_in: newer.expires_in.or(self.expires_in),
            expires_at: newer.expires_at,
            extra,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_endpoint_response() {
        let mut token: OAuth2Token = serde_json::from_value(json!({
            "refresh_token": "mock-refresh-token",
            "access_token": "mock-access-token",
            "type": "Bearer",
            "expires_in": 60
        }))
        .unwrap();

        assert_eq!(token.extra["type"], "Bearer");
        assert!(!token.is_valid_at(1000.0));

        token.stamp_expiry(1000.0);
        assert_eq!(token.expires_at, Some(1060.0));
        assert!(token.is_valid_at(1059.5));
        assert!(!token.is_valid_at(1060.0));

        let value = token.to_value();
        assert_eq!(value["type"], "Bearer");
        assert_eq!(value["expires_at"], 1060.0);
    }

    #[test]
    fn test_merge_keeps_refresh_token() {
        let old: OAuth2Token = serde_json::from_value(json!({
            "access_token": "old",
            "refresh_token": "refresh",
            "expires_in": 60,
            "scope": "profile"
        }))
        .unwrap();
        let newer: OAuth2Token = serde_json::from_value(json!({
            "access_token": "new",
            "expires_in": 120
        }))
        .unwrap();

        let merged = old.merge(newer);
        assert_eq!(merged.access_token, "new");
        assert_eq!(merged.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(merged.expires_in, Some(120.0));
        assert_eq!(merged.extra["scope"], "profile");
    }
}
