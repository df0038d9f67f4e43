//! OAuth2 support for config flows
//!
//! Integrations register one or more [`OAuth2Implementation`]s for their
//! domain. A config flow embeds an [`OAuth2Flow`] to pick an implementation,
//! send the user to the authorize URL and exchange the returned code for a
//! token. The code comes back through the callback view at
//! [`AUTH_CALLBACK_PATH`], which finds the flow from the signed `state`
//! parameter. Once an entry exists, an [`OAuth2Session`] keeps its token
//! fresh.

mod error;
mod flow;
mod implementation;
mod jwt;
mod query;
mod registry;
mod session;
mod token;
mod view;

pub use error::{OAuth2Error, OAuth2Result};
pub use flow::{OAuth2Flow, AUTHORIZE_URL_TIMEOUT};
pub use implementation::{LocalOAuth2Implementation, OAuth2Implementation};
pub use jwt::{decode_jwt, encode_jwt, FlowState};
pub use query::{encode_query, update_query};
pub use registry::{
    async_get_config_entry_implementation, async_get_implementations,
    async_register_implementation,
};
pub use session::OAuth2Session;
pub use token::OAuth2Token;
pub use view::{callback_router, AUTH_CALLBACK_PATH};
