//! Reducer registry
//!
//! Reducers fold events into new state. Device-event reducers are keyed by
//! `device:attr`, action reducers by the producer's identity. Several
//! reducers may share a key; they run in registration order, each receiving
//! the state produced by the previous one.
//!
//! A reducer that returns an error or panics is logged and removed for the
//! life of the registry. The fold carries on with the last good state.

use fleetstate_core::{Action, Event, EventKey, GenericEvent, ReducerId, RoutingKey};
use fleetstate_devices::ActionProducer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::isolation::run_isolated;

/// Folds one event into a new state
pub trait Reducer<S>: Send + Sync {
    /// Key of the events this reducer handles
    fn routing_key(&self) -> RoutingKey;

    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Produce the next state; the input state is never modified
    fn reduce(&self, state: &S, event: &GenericEvent) -> anyhow::Result<S>;
}

type EventFn<S> = dyn Fn(&S, &Event) -> anyhow::Result<S> + Send + Sync;
type ActionFn<S> = dyn Fn(&S, &Action) -> anyhow::Result<S> + Send + Sync;

/// Reducer for changes of one device attribute
pub struct EventsReducer<S> {
    key: EventKey,
    name: String,
    reduce: Box<EventFn<S>>,
}

impl<S> EventsReducer<S> {
    /// Reduce changes of `device:attr` with `f`
    pub fn new<F>(device: impl Into<String>, attr: impl Into<String>, f: F) -> Self
    where
        F: Fn(&S, &Event) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let key = EventKey::new(device, attr);
        Self {
            name: format!("reducer({})", key),
            key,
            reduce: Box::new(f),
        }
    }

    /// Set the diagnostic name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Device attribute this reducer handles
    pub fn key(&self) -> &EventKey {
        &self.key
    }
}

impl<S> Reducer<S> for EventsReducer<S> {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::Attribute(self.key.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reduce(&self, state: &S, event: &GenericEvent) -> anyhow::Result<S> {
        match event {
            GenericEvent::Device(event) => (self.reduce)(state, event),
            GenericEvent::Action(action) => {
                anyhow::bail!("{} received an action from {}", self.name, action.source())
            }
        }
    }
}

/// Reducer for the actions of one producer
pub struct ActionsReducer<S> {
    producer: Arc<ActionProducer>,
    name: String,
    reduce: Box<ActionFn<S>>,
}

impl<S> ActionsReducer<S> {
    /// Reduce actions pushed by `producer` with `f`
    pub fn new<F>(producer: Arc<ActionProducer>, f: F) -> Self
    where
        F: Fn(&S, &Action) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        Self {
            name: format!("reducer({})", producer.name()),
            producer,
            reduce: Box::new(f),
        }
    }

    /// Set the diagnostic name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Producer whose actions this reducer handles
    pub fn producer(&self) -> &Arc<ActionProducer> {
        &self.producer
    }
}

impl<S> Reducer<S> for ActionsReducer<S> {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::Producer(self.producer.id())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reduce(&self, state: &S, event: &GenericEvent) -> anyhow::Result<S> {
        match event {
            GenericEvent::Action(action) => (self.reduce)(state, action),
            GenericEvent::Device(event) => {
                anyhow::bail!("{} received a device event for {}", self.name, event.key())
            }
        }
    }
}

struct ReducerEntry<S> {
    id: ReducerId,
    reducer: Arc<dyn Reducer<S>>,
}

impl<S> Clone for ReducerEntry<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            reducer: self.reducer.clone(),
        }
    }
}

/// Ordered reducers per routing key
pub struct ReducerRegistry<S> {
    reducers: Mutex<HashMap<RoutingKey, Vec<ReducerEntry<S>>>>,
}

impl<S> ReducerRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            reducers: Mutex::new(HashMap::new()),
        }
    }

    /// Append a reducer to its key's list
    ///
    /// Returns the reducer's handle and whether it is the first for its key.
    pub fn add(&self, reducer: Arc<dyn Reducer<S>>) -> (ReducerId, bool) {
        let id = ReducerId::new();
        let key = reducer.routing_key();
        let mut reducers = self.reducers.lock();
        let entries = reducers.entry(key.clone()).or_default();
        let first = entries.is_empty();
        tracing::debug!("{} registered for {} as {}", reducer.name(), key, id);
        entries.push(ReducerEntry { id, reducer });
        (id, first)
    }

    /// Remove one reducer
    pub fn remove(&self, id: ReducerId) -> bool {
        let mut reducers = self.reducers.lock();
        let mut removed = false;
        reducers.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Remove every reducer for a key, returning how many were dropped
    pub fn remove_key(&self, key: &RoutingKey) -> usize {
        self.reducers.lock().remove(key).map_or(0, |entries| entries.len())
    }

    /// Number of reducers registered for a key
    pub fn count(&self, key: &RoutingKey) -> usize {
        self.reducers.lock().get(key).map_or(0, Vec::len)
    }

    /// Whether any reducer handles `key`
    pub fn contains_key(&self, key: &RoutingKey) -> bool {
        self.count(key) > 0
    }

    /// Keys with at least one reducer
    pub fn keys(&self) -> Vec<RoutingKey> {
        self.reducers.lock().keys().cloned().collect()
    }

    /// Fold `event` through every reducer for its key, in order
    ///
    /// Returns `None` when no reducer handles the key. Failing reducers are
    /// removed; the next reducer receives the last good state.
    pub fn apply(&self, state: &S, event: &GenericEvent) -> Option<S> {
        let key = event.routing_key();
        let entries: Vec<ReducerEntry<S>> = self.reducers.lock().get(&key)?.clone();

        let mut current: Option<S> = None;
        let mut failed = Vec::new();
        for entry in &entries {
            let input = current.as_ref().unwrap_or(state);
            match run_isolated(|| entry.reducer.reduce(input, event)) {
                Ok(next) => current = Some(next),
                Err(reason) => {
                    tracing::error!(
                        reducer = %entry.reducer.name(),
                        key = %key,
                        "Reducer failed and was removed: {}",
                        reason
                    );
                    failed.push(entry.id);
                }
            }
        }

        if !failed.is_empty() {
            let mut reducers = self.reducers.lock();
            if let Some(entries) = reducers.get_mut(&key) {
                entries.retain(|entry| !failed.contains(&entry.id));
            }
        }

        current
    }
}

impl<S> Default for ReducerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
