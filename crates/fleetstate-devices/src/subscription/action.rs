use fleetstate_core::{ActionSink, DeviceError, GenericEvent, GenericEventSink, RoutingKey, SinkId};
use std::sync::Arc;

use super::{Subscription, SubscriptionMode};
use crate::action::ActionProducer;

/// Subscription routing a producer's actions into the pipeline
pub struct ActionSubscription {
    producer: Arc<ActionProducer>,
    sink_id: Option<SinkId>,
}

impl ActionSubscription {
    /// Create an inactive action subscription
    pub fn new(producer: Arc<ActionProducer>) -> Self {
        Self {
            producer,
            sink_id: None,
        }
    }
}

impl Subscription for ActionSubscription {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::Producer(self.producer.id())
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Action
    }

    fn start(&mut self, sink: GenericEventSink) -> Result<(), DeviceError> {
        if self.sink_id.is_none() {
            let action_sink: ActionSink = Arc::new(move |action| sink(GenericEvent::Action(action)));
            self.sink_id = Some(self.producer.subscribe_action(action_sink));
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(id) = self.sink_id.take() {
            self.producer.unsubscribe_action(id);
        }
    }

    fn is_active(&self) -> bool {
        self.sink_id.is_some()
    }
}

impl Drop for ActionSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
