//! Test Home Assistant instance

use std::net::TcpListener;
use std::sync::Arc;

use ha_almond::Almond;
use ha_config::CoreConfig;
use ha_runtime::HomeAssistant;
use tempfile::TempDir;

/// An isolated instance with the Almond integration registered
///
/// The returned directory holds the instance's storage; keep it alive for
/// the duration of the test.
pub fn async_test_home_assistant() -> (TempDir, Arc<HomeAssistant>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let hass = HomeAssistant::new(dir.path(), CoreConfig::default());
    hass.integrations.register(Arc::new(Almond));
    (dir, hass)
}

/// A local URL nothing listens on
pub fn unreachable_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
