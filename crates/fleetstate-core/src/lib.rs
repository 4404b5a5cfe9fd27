//! # FleetState Core
//!
//! Core types, errors and the event bus for FleetState.
//! Provides the event data model shared by devices, subscriptions and the
//! state coordinator, plus the queue that connects them.

pub mod error;
pub mod event_bus;
pub mod types;

pub use error::{DeviceError, EngineError};

// Re-export event bus for convenience
pub use event_bus::{
    Action, AttrValue, BusError, Event, EventBus, EventBusConfig, EventKey,
    GenericEvent, PolledAttribute, ProducerId, RoutingKey, DEFAULT_LATENCY_WINDOW,
};

// Re-export type aliases for convenience
pub use types::{
    thread_safe_vec, ActionSink, ChangeCallback, DataCallback, DeviceHandle, EventSink,
    GenericEventSink, ObserverId, ReducerId, SinkId, ThreadSafeVec,
};
