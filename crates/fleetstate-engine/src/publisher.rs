//! Publishers
//!
//! A publisher pairs a selector with an observer. After every processed event
//! the coordinator asks each publisher to publish the new state; the observer
//! only hears about values that differ from the last one it was given.

use fleetstate_core::ObserverId;
use parking_lot::Mutex;
use std::marker::PhantomData;

use crate::selector::Select;

/// Delivers selected state to an observer
pub trait Publish<S>: Send + Sync {
    /// Registration handle
    fn id(&self) -> ObserverId;

    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Select from `state` and notify the observer on change
    ///
    /// Returns whether the observer was invoked.
    fn publish(&self, state: &S) -> anyhow::Result<bool>;
}

type ObserverFn<T> = dyn Fn(&T) -> anyhow::Result<()> + Send + Sync;

/// Change-detecting publisher for one selector
pub struct Publisher<S, Sel>
where
    Sel: Select<S>,
{
    id: ObserverId,
    name: String,
    selector: Sel,
    observer: Box<ObserverFn<Sel::Output>>,
    last: Mutex<Option<Sel::Output>>,
    _state: PhantomData<fn(&S)>,
}

impl<S, Sel> Publisher<S, Sel>
where
    Sel: Select<S>,
{
    /// Observe the values produced by `selector`
    pub fn new<F>(selector: Sel, observer: F) -> Self
    where
        F: Fn(&Sel::Output) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ObserverId::new();
        Self {
            name: id.to_string(),
            id,
            selector,
            observer: Box::new(observer),
            last: Mutex::new(None),
            _state: PhantomData,
        }
    }

    /// Set the diagnostic name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Last value the observer accepted
    pub fn last_value(&self) -> Option<Sel::Output> {
        self.last.lock().clone()
    }
}

impl<S, Sel> Publish<S> for Publisher<S, Sel>
where
    Sel: Select<S>,
{
    fn id(&self) -> ObserverId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&self, state: &S) -> anyhow::Result<bool> {
        let value = self.selector.select(state);
        if self.last.lock().as_ref() == Some(&value) {
            return Ok(false);
        }

        (self.observer)(&value)?;
        *self.last.lock() = Some(value);
        Ok(true)
    }
}
