//! # Event Bus Module
//!
//! The queue between event producers and the state coordinator's single
//! processing thread.
//!
//! ## Overview
//!
//! - Producers push [`GenericEvent`]s without blocking
//! - The processing thread blocks on [`EventBus::next`]
//! - Teardown pushes a dedicated sentinel through [`EventBus::cancel`]
//! - Processed events feed a bounded latency window for diagnostics
//!
//! ## Usage
//!
//! ```rust
//! use fleetstate_core::event_bus::{BusError, Event, EventBus, EventKey};
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! bus.push(Event::new(EventKey::new("d1", "state"), json!("ON")));
//! bus.cancel();
//!
//! let event = bus.next(None).unwrap();
//! assert_eq!(event.routing_key().to_string(), "d1:state");
//! assert_eq!(bus.next(None), Err(BusError::Cancelled));
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
