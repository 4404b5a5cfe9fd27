//! Subscriptions
//!
//! A subscription connects one routing key to the event pipeline. Device
//! attributes use either the device's own change notification
//! ([`PushSubscription`]) or the shared [`AttributePoller`]
//! ([`PollSubscription`]); producers use [`ActionSubscription`]. All share the
//! same `start`/`stop` contract so the coordinator treats them uniformly.

mod action;
mod poll;
mod push;

pub use action::ActionSubscription;
pub use poll::PollSubscription;
pub use push::PushSubscription;

use fleetstate_core::{DeviceError, EventKey, GenericEventSink, RoutingKey};
use fleetstate_settings::EngineSettings;
use std::sync::Arc;

use crate::action::ActionProducer;
use crate::device::DeviceDirectory;
use crate::poller::AttributePoller;

/// How a subscription receives its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    /// Device change notification
    Push,
    /// Shared attribute poller
    Poll,
    /// Action producer
    Action,
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Poll => write!(f, "poll"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Start/stop contract shared by every subscription variant
pub trait Subscription: Send {
    /// Key of the events this subscription produces
    fn routing_key(&self) -> RoutingKey;

    /// Delivery mechanism
    fn mode(&self) -> SubscriptionMode;

    /// Begin delivering events to `sink`
    ///
    /// Device subscriptions deliver the current value synchronously before
    /// returning. Starting an active subscription is a no-op.
    fn start(&mut self, sink: GenericEventSink) -> Result<(), DeviceError>;

    /// Stop delivering events; stopping an inactive subscription is a no-op
    fn stop(&mut self);

    /// Whether `start` succeeded and `stop` has not been called since
    fn is_active(&self) -> bool;
}

/// Builds subscriptions according to the engine's push/poll policy
#[derive(Clone)]
pub struct SubscriptionFactory {
    directory: Arc<dyn DeviceDirectory>,
    poller: Arc<AttributePoller>,
    settings: EngineSettings,
}

impl SubscriptionFactory {
    /// Create a factory sharing one poller
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        poller: Arc<AttributePoller>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            directory,
            poller,
            settings,
        }
    }

    /// Subscription for a device attribute
    ///
    /// Push is preferred unless `force_polling` is set.
    pub fn for_attribute(&self, key: EventKey) -> Box<dyn Subscription> {
        if self.settings.force_polling {
            Box::new(PollSubscription::new(key, self.poller.clone()))
        } else {
            Box::new(PushSubscription::new(
                key,
                self.directory.clone(),
                self.settings.push_fallback_poll_ms,
                self.settings.fast_poll_interval_ms,
            ))
        }
    }

    /// Subscription for an action producer
    pub fn for_producer(&self, producer: Arc<ActionProducer>) -> Box<dyn Subscription> {
        Box::new(ActionSubscription::new(producer))
    }

    /// Whether device subscriptions are forced into poll mode
    pub fn force_polling(&self) -> bool {
        self.settings.force_polling
    }
}
