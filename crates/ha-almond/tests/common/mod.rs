//! Test utilities for the Almond integration
//!
//! An isolated instance with the integration registered, and config entries
//! that can be added without going through a flow.

#![allow(dead_code)]

mod mock_config_entry;
mod test_hass;

pub use mock_config_entry::*;
pub use test_hass::*;
