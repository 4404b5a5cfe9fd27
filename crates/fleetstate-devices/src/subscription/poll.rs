use fleetstate_core::{
    DeviceError, EventKey, EventSink, GenericEvent, GenericEventSink, RoutingKey, SinkId,
};
use std::sync::Arc;

use super::{Subscription, SubscriptionMode};
use crate::poller::AttributePoller;

/// Subscription served by the shared attribute poller
pub struct PollSubscription {
    key: EventKey,
    poller: Arc<AttributePoller>,
    sink_id: Option<SinkId>,
}

impl PollSubscription {
    /// Create an inactive poll subscription
    pub fn new(key: EventKey, poller: Arc<AttributePoller>) -> Self {
        Self {
            key,
            poller,
            sink_id: None,
        }
    }
}

impl Subscription for PollSubscription {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::Attribute(self.key.clone())
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Poll
    }

    fn start(&mut self, sink: GenericEventSink) -> Result<(), DeviceError> {
        if self.sink_id.is_some() {
            return Ok(());
        }
        let event_sink: EventSink = Arc::new(move |event| sink(GenericEvent::Device(event)));
        self.sink_id = Some(self.poller.add_subscription(self.key.clone(), event_sink)?);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(id) = self.sink_id.take() {
            self.poller.remove_subscription(id);
        }
    }

    fn is_active(&self) -> bool {
        self.sink_id.is_some()
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
