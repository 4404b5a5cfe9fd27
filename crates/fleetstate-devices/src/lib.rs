//! # FleetState Devices
//!
//! Everything between remote devices and the event bus: the device access
//! facade, an in-memory simulated implementation, the shared attribute
//! poller, action producers and the push/poll/action subscriptions.

pub mod action;
pub mod device;
pub mod poller;
pub mod subscription;

pub use action::ActionProducer;
pub use device::{Device, DeviceDirectory, PushSupport, SimulatedDevice, SimulatedDirectory};
pub use poller::{AttributePoller, PollingState, DEFAULT_POLL_INTERVAL};
pub use subscription::{
    ActionSubscription, PollSubscription, PushSubscription, Subscription, SubscriptionFactory,
    SubscriptionMode,
};
