use ha_config_entries::ConfigEntriesError;
use ha_runtime::FlowError;
use thiserror::Error;

/// OAuth2 errors
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unable to sign state: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("No OAuth2 implementation {implementation} registered for {domain}")]
    UnknownImplementation {
        domain: String,
        implementation: String,
    },

    #[error("Config entry {0} has no valid token")]
    MissingToken(String),

    #[error("Invalid external data: {0}")]
    InvalidExternalData(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

impl From<OAuth2Error> for FlowError {
    fn from(err: OAuth2Error) -> Self {
        FlowError::handler(err)
    }
}
