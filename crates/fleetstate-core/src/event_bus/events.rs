//! Event type definitions for the event bus.
//!
//! Device-sourced attribute changes and in-process actions share one queue.
//! Both are wrapped in [`GenericEvent`] at the point they are produced, and
//! both expose a single [`RoutingKey`] used to find reducers and subscriptions.
//! Events are cloneable and serializable for logging/replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dynamically typed attribute value, compared by value equality.
pub type AttrValue = serde_json::Value;

/// Identity of one attribute on one device.
///
/// Displays as `device:attr`. The same pair is used for events, poller
/// registrations and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Device name as understood by the device facade.
    pub device: String,
    /// Attribute name on that device.
    pub attr: String,
}

impl EventKey {
    /// Create a key for `device:attr`
    pub fn new(device: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            attr: attr.into(),
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.device, self.attr)
    }
}

/// A polled attribute is identified exactly like an event key.
pub type PolledAttribute = EventKey;

/// Identity of an action producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerId(Uuid);

impl ProducerId {
    /// Create a new unique producer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProducerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Producer({})", &self.0.to_string()[..8])
    }
}

/// Single identity used to route any event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingKey {
    /// Device attribute changes.
    Attribute(EventKey),
    /// Actions pushed by one producer.
    Producer(ProducerId),
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingKey::Attribute(key) => write!(f, "{}", key),
            RoutingKey::Producer(id) => write!(f, "{}", id),
        }
    }
}

impl From<EventKey> for RoutingKey {
    fn from(key: EventKey) -> Self {
        RoutingKey::Attribute(key)
    }
}

impl From<ProducerId> for RoutingKey {
    fn from(id: ProducerId) -> Self {
        RoutingKey::Producer(id)
    }
}

/// A device attribute change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    key: EventKey,
    value: AttrValue,
    timestamp: DateTime<Utc>,
    error: bool,
}

impl Event {
    /// Create a change event stamped now
    pub fn new(key: EventKey, value: AttrValue) -> Self {
        Self {
            key,
            value,
            timestamp: Utc::now(),
            error: false,
        }
    }

    /// Create an error event; the error text becomes the value
    pub fn error(key: EventKey, message: impl Into<String>) -> Self {
        Self {
            key,
            value: AttrValue::String(message.into()),
            timestamp: Utc::now(),
            error: true,
        }
    }

    /// Override the timestamp (device-provided read time)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Device and attribute this event belongs to
    pub fn key(&self) -> &EventKey {
        &self.key
    }

    /// Attribute value, or the error text for error events
    pub fn value(&self) -> &AttrValue {
        &self.value
    }

    /// When the value was read
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the device reported an error instead of a value
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// An in-process effect pushed by an action producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    payload: serde_json::Value,
    source: ProducerId,
    timestamp: DateTime<Utc>,
}

impl Action {
    /// Create an action stamped now
    pub fn new(source: ProducerId, payload: serde_json::Value) -> Self {
        Self {
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    /// Action payload
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Producer that pushed this action
    pub fn source(&self) -> ProducerId {
        self.source
    }

    /// When the action was pushed
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Root event enum carried by the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenericEvent {
    /// Device attribute change
    Device(Event),
    /// Producer action
    Action(Action),
}

impl GenericEvent {
    /// Key used to look up reducers for this event
    pub fn routing_key(&self) -> RoutingKey {
        match self {
            GenericEvent::Device(event) => RoutingKey::Attribute(event.key.clone()),
            GenericEvent::Action(action) => RoutingKey::Producer(action.source),
        }
    }

    /// Creation time of the wrapped event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GenericEvent::Device(event) => event.timestamp,
            GenericEvent::Action(action) => action.timestamp,
        }
    }

    /// The device event, if this is one
    pub fn as_device(&self) -> Option<&Event> {
        match self {
            GenericEvent::Device(event) => Some(event),
            GenericEvent::Action(_) => None,
        }
    }

    /// The action, if this is one
    pub fn as_action(&self) -> Option<&Action> {
        match self {
            GenericEvent::Action(action) => Some(action),
            GenericEvent::Device(_) => None,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            GenericEvent::Device(event) if event.error => {
                format!("{} error: {}", event.key, event.value)
            }
            GenericEvent::Device(event) => format!("{} = {}", event.key, event.value),
            GenericEvent::Action(action) => format!("{} action {}", action.source, action.payload),
        }
    }
}

impl From<Event> for GenericEvent {
    fn from(event: Event) -> Self {
        GenericEvent::Device(event)
    }
}

impl From<Action> for GenericEvent {
    fn from(action: Action) -> Self {
        GenericEvent::Action(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_key_display() {
        let key = EventKey::new("d1", "attr");
        assert_eq!(key.to_string(), "d1:attr");
        assert_eq!(key, EventKey::new("d1".to_string(), "attr".to_string()));
        assert_ne!(key, EventKey::new("d1", "Attr"));
    }

    #[test]
    fn test_routing_key() {
        let event = GenericEvent::from(Event::new(EventKey::new("d1", "state"), json!("ON")));
        assert_eq!(
            event.routing_key(),
            RoutingKey::Attribute(EventKey::new("d1", "state"))
        );
        assert!(event.as_action().is_none());

        let producer = ProducerId::new();
        let action = GenericEvent::from(Action::new(producer, json!({"cmd": "reset"})));
        assert_eq!(action.routing_key(), RoutingKey::Producer(producer));
        assert!(action.as_device().is_none());
    }

    #[test]
    fn test_error_event() {
        let event = Event::error(EventKey::new("d1", "temp"), "device offline");
        assert!(event.is_error());
        assert_eq!(event.value(), &json!("device offline"));

        let description = GenericEvent::from(event).description();
        assert!(description.contains("error"));
        assert!(description.contains("d1:temp"));
    }

    #[test]
    fn test_event_serialization() {
        let event = GenericEvent::from(Event::new(EventKey::new("d1", "temp"), json!(21.5)));
        let json = serde_json::to_string(&event).expect("Should serialize");
        let parsed: GenericEvent = serde_json::from_str(&json).expect("Should deserialize");
        assert_eq!(parsed, event);
    }
}
