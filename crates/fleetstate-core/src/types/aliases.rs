//! Type aliases for commonly used complex types.
//!
//! Gives meaningful names to the callback types shared by
//! the poller, the subscriptions and the coordinator.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetstate_core::types::*;
//!
//! // Instead of: Arc<Mutex<Vec<String>>>
//! let queue: ThreadSafeVec<String> = thread_safe_vec();
//!
//! // Instead of: Arc<dyn Fn(Event) + Send + Sync>
//! let sink: EventSink = Arc::new(|event| println!("{:?}", event));
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::DeviceError;
use crate::event_bus::{Action, AttrValue, Event, GenericEvent};

// =============================================================================
// THREAD-SAFE SHARED TYPES
// =============================================================================

/// A thread-safe vector, used to collect events across threads.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// A callback that receives a single parameter.
pub type DataCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Receives device events from the poller or a push subscription.
///
/// Sinks run on the producing thread (device callback or poller) and
/// must return quickly; the coordinator's sink only enqueues.
pub type EventSink = DataCallback<Event>;

/// Receives actions from an action producer.
pub type ActionSink = DataCallback<Action>;

/// Receives any bus-bound event from a started subscription.
pub type GenericEventSink = DataCallback<GenericEvent>;

/// Invoked by a device when a subscribed attribute changes.
pub type ChangeCallback = DataCallback<Result<AttrValue, DeviceError>>;

// =============================================================================
// CONSTRUCTOR HELPERS
// =============================================================================

/// Create a new empty `ThreadSafeVec<T>`.
#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}
