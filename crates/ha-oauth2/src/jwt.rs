//! Signed `state` parameter for the authorize redirect

use std::sync::Arc;

use ha_runtime::HomeAssistant;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::OAuth2Result;

/// Claims carried through the authorize redirect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub flow_id: String,
}

/// Per-instance signing secret
struct JwtSecret([u8; 32]);

impl JwtSecret {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

fn secret(hass: &HomeAssistant) -> Arc<JwtSecret> {
    hass.data.get_or_insert_with(JwtSecret::generate)
}

/// Sign `claims` with the instance secret (HS256)
///
/// The same claims always produce the same token on one instance.
pub fn encode_jwt<T: Serialize>(hass: &HomeAssistant, claims: &T) -> OAuth2Result<String> {
    let secret = secret(hass);
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(&secret.0),
    )?)
}

/// Verify and decode a token signed by [`encode_jwt`]
pub fn decode_jwt<T: DeserializeOwned>(hass: &HomeAssistant, token: &str) -> Option<T> {
    let secret = secret(hass);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;

    match jsonwebtoken::decode::<T>(
        token,
        &DecodingKey::from_secret(&secret.0),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            debug!("Rejected state token: {}", err);
            None
        }
    }
}
