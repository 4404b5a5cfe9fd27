//! # FleetState Engine
//!
//! Turns the event stream produced by device and action subscriptions into
//! one aggregate state value. Reducers fold events into new state, selectors
//! project it and publishers notify observers when a projection changes.
//! [`StateCoordinator`] ties these together around a single processing
//! thread.

pub mod coordinator;
mod isolation;
pub mod publisher;
pub mod reducer;
pub mod selector;

pub use coordinator::StateCoordinator;
pub use publisher::{Publish, Publisher};
pub use reducer::{ActionsReducer, EventsReducer, Reducer, ReducerRegistry};
pub use selector::{derived, root, DerivedSelector, RootSelector, Select, SelectorInputs};
