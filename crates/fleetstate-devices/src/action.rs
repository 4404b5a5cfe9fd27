//! Action producers
//!
//! Any component can own an [`ActionProducer`] and push in-process actions.
//! Actions travel the same reducer/selector pipeline as device events once
//! the coordinator subscribes to the producer.

use fleetstate_core::{Action, ActionSink, ProducerId, SinkId};
use parking_lot::Mutex;

/// Source of application actions
pub struct ActionProducer {
    id: ProducerId,
    name: String,
    sinks: Mutex<Vec<(SinkId, ActionSink)>>,
}

impl ActionProducer {
    /// Create a producer with a fresh identity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProducerId::new(),
            name: name.into(),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Identity used to key action reducers
    pub fn id(&self) -> ProducerId {
        self.id
    }

    /// Human-readable name for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver an action to every subscribed sink
    ///
    /// Returns the number of sinks that received it.
    pub fn push_action(&self, payload: serde_json::Value) -> usize {
        let action = Action::new(self.id, payload);
        let sinks: Vec<ActionSink> = self
            .sinks
            .lock()
            .iter()
            .map(|(_, sink)| sink.clone())
            .collect();
        if sinks.is_empty() {
            tracing::debug!("{} ({}): action dropped, no subscribers", self.name, self.id);
        }
        for sink in &sinks {
            sink(action.clone());
        }
        sinks.len()
    }

    /// Register a sink for this producer's actions
    pub fn subscribe_action(&self, sink: ActionSink) -> SinkId {
        let id = SinkId::new();
        self.sinks.lock().push((id, sink));
        tracing::debug!("{}: action sink {} added", self.name, id);
        id
    }

    /// Remove a sink; returns false if it was not registered
    pub fn unsubscribe_action(&self, id: SinkId) -> bool {
        let mut sinks = self.sinks.lock();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        before != sinks.len()
    }

    /// Number of registered sinks
    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }
}

impl std::fmt::Debug for ActionProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionProducer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
