//! Event bus
//!
//! A broadcast channel carrying JSON events. Subscribers that fall behind
//! lose the oldest events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Fired when an external flow step moved on, so UIs can reload the flow
pub const EVENT_DATA_ENTRY_FLOW_PROGRESSED: &str = "data_entry_flow_progressed";

/// An event fired on the bus
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub data: serde_json::Value,
    pub time_fired: DateTime<Utc>,
}

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to every event fired from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Fire an event to all subscribers
    pub fn fire(&self, event_type: impl Into<String>, data: serde_json::Value) {
        let event = Event {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
        };
        debug!(event_type = %event.event_type, "Firing event");

        // No receivers is not an error
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
