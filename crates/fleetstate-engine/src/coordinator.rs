//! State coordinator
//!
//! Owns the aggregate state and the pipeline that maintains it:
//!
//! - reducers register per routing key; the first reducer for a key creates
//!   the subscription that feeds it
//! - `start_subscriptions` connects every subscription to the event bus
//! - `start_listening` spawns the single processing thread, which dequeues
//!   events, folds them through the reducers, swaps in the new state and
//!   publishes it to every observer
//!
//! State is copy-on-write: readers hold `Arc<S>` snapshots that are never
//! mutated, and the processing thread replaces the snapshot once per event.

use fleetstate_core::{
    BusError, DeviceError, EngineError, EventBus, EventBusConfig, GenericEvent, GenericEventSink,
    ObserverId, ReducerId, RoutingKey,
};
use fleetstate_devices::{AttributePoller, DeviceDirectory, Subscription, SubscriptionFactory};
use fleetstate_settings::EngineSettings;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::isolation::run_isolated;
use crate::publisher::{Publish, Publisher};
use crate::reducer::{ActionsReducer, EventsReducer, ReducerRegistry};
use crate::selector::Select;

const WORKER_THREAD_NAME: &str = "state-coordinator";
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Milliseconds in `duration`, saturating at `u64::MAX`
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// State shared with the processing thread
struct Shared<S> {
    bus: Arc<EventBus>,
    reducers: ReducerRegistry<S>,
    publishers: Mutex<Vec<Arc<dyn Publish<S>>>>,
    state: watch::Sender<Arc<S>>,
    running: AtomicBool,
    pacing: Duration,
}

impl<S> Shared<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn run(&self) {
        tracing::debug!("Processing thread started");
        loop {
            let event = match self.bus.next(None) {
                Ok(event) => event,
                Err(BusError::Cancelled) => break,
                Err(BusError::Timeout) => continue,
            };

            if !self.running.load(Ordering::SeqCst) {
                tracing::debug!("Discarding {} received after stop", event.description());
                continue;
            }

            self.process(&event);

            if !self.pacing.is_zero() {
                thread::sleep(self.pacing);
            }
        }
        tracing::debug!("Processing thread finished");
    }

    fn process(&self, event: &GenericEvent) {
        let current = self.state.borrow().clone();
        let state = match self.reducers.apply(&current, event) {
            Some(next) => {
                let next = Arc::new(next);
                self.state.send_replace(next.clone());
                next
            }
            None => {
                tracing::trace!("No reducer for {}", event.routing_key());
                current
            }
        };

        self.publish(&state);
        self.bus.record_processed(event);
    }

    fn publish(&self, state: &S) {
        let publishers: Vec<Arc<dyn Publish<S>>> = self.publishers.lock().clone();

        let mut failed = Vec::new();
        for publisher in &publishers {
            if let Err(reason) = run_isolated(|| publisher.publish(state)) {
                tracing::error!(
                    observer = %publisher.name(),
                    "Observer failed and was removed: {}",
                    reason
                );
                failed.push(publisher.id());
            }
        }

        if !failed.is_empty() {
            self.publishers
                .lock()
                .retain(|publisher| !failed.contains(&publisher.id()));
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    cancelled: bool,
}

/// Maintains an aggregate state from device events and actions
pub struct StateCoordinator<S> {
    shared: Arc<Shared<S>>,
    factory: SubscriptionFactory,
    poller: Arc<AttributePoller>,
    subscriptions: Mutex<HashMap<RoutingKey, Box<dyn Subscription>>>,
    worker: Mutex<Option<Worker>>,
    settings: EngineSettings,
}

impl<S> StateCoordinator<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create a coordinator with default settings and environment overrides
    pub fn new(initial: S, directory: Arc<dyn DeviceDirectory>) -> Self {
        let mut settings = EngineSettings::default();
        settings.apply_env_overrides();
        Self::with_settings(initial, directory, settings)
    }

    /// Create a coordinator with explicit settings
    pub fn with_settings(
        initial: S,
        directory: Arc<dyn DeviceDirectory>,
        settings: EngineSettings,
    ) -> Self {
        let bus = Arc::new(EventBus::with_config(EventBusConfig {
            latency_window: settings.latency_window,
        }));
        let poller = Arc::new(AttributePoller::with_interval(
            directory.clone(),
            settings.poll_interval(),
        ));
        let factory = SubscriptionFactory::new(directory, poller.clone(), settings.clone());
        let (state, _) = watch::channel(Arc::new(initial));

        tracing::debug!(
            force_polling = settings.force_polling,
            pacing_ms = settings.pacing_interval_ms,
            "State coordinator created"
        );

        Self {
            shared: Arc::new(Shared {
                bus,
                reducers: ReducerRegistry::new(),
                publishers: Mutex::new(Vec::new()),
                state,
                running: AtomicBool::new(false),
                pacing: settings.pacing_interval(),
            }),
            factory,
            poller,
            subscriptions: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
            settings,
        }
    }

    /// Register a reducer for a device attribute
    ///
    /// The first reducer for an attribute creates its subscription; it is
    /// connected by the next [`StateCoordinator::start_subscriptions`].
    pub fn add_events_reducer(&self, reducer: EventsReducer<S>) -> ReducerId {
        let key = reducer.key().clone();
        let (id, _) = self.shared.reducers.add(Arc::new(reducer));
        self.subscriptions
            .lock()
            .entry(RoutingKey::Attribute(key.clone()))
            .or_insert_with(|| self.factory.for_attribute(key));
        id
    }

    /// Register a reducer for the actions of a producer
    pub fn add_action_reducer(&self, reducer: ActionsReducer<S>) -> ReducerId {
        let producer = reducer.producer().clone();
        let (id, _) = self.shared.reducers.add(Arc::new(reducer));
        self.subscriptions
            .lock()
            .entry(RoutingKey::Producer(producer.id()))
            .or_insert_with(|| self.factory.for_producer(producer));
        id
    }

    /// Remove a single reducer; its subscription stays in place
    pub fn remove_reducer(&self, id: ReducerId) -> bool {
        self.shared.reducers.remove(id)
    }

    /// Observe the values produced by `selector`
    pub fn add_observer<Sel, F>(&self, selector: Sel, observer: F) -> ObserverId
    where
        Sel: Select<S> + 'static,
        F: Fn(&Sel::Output) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_publisher(Publisher::new(selector, observer))
    }

    /// Observe with a name that appears in diagnostics
    pub fn add_named_observer<Sel, F>(
        &self,
        name: impl Into<String>,
        selector: Sel,
        observer: F,
    ) -> ObserverId
    where
        Sel: Select<S> + 'static,
        F: Fn(&Sel::Output) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_publisher(Publisher::new(selector, observer).with_name(name))
    }

    /// Register any publisher implementation
    pub fn add_publisher(&self, publisher: impl Publish<S> + 'static) -> ObserverId {
        let id = publisher.id();
        tracing::debug!("Observer {} added", publisher.name());
        self.shared.publishers.lock().push(Arc::new(publisher));
        id
    }

    /// Remove an observer; returns false if it is not registered
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut publishers = self.shared.publishers.lock();
        let before = publishers.len();
        publishers.retain(|publisher| publisher.id() != id);
        before != publishers.len()
    }

    /// Start every subscription that is not running yet
    ///
    /// A key whose subscription fails to start loses its subscription and
    /// all of its reducers; other keys are unaffected. The failed keys are
    /// returned with their errors.
    pub fn start_subscriptions(&self) -> Vec<(RoutingKey, DeviceError)> {
        let bus = self.shared.bus.clone();
        let sink: GenericEventSink = Arc::new(move |event| bus.push(event));

        let mut failures = Vec::new();
        let mut subscriptions = self.subscriptions.lock();
        for (key, subscription) in subscriptions.iter_mut() {
            if subscription.is_active() {
                continue;
            }
            match subscription.start(sink.clone()) {
                Ok(()) => {
                    tracing::debug!("Subscription {} started ({})", key, subscription.mode())
                }
                Err(e) => failures.push((key.clone(), e)),
            }
        }

        for (key, error) in &failures {
            subscriptions.remove(key);
            let dropped = self.shared.reducers.remove_key(key);
            tracing::error!(
                key = %key,
                reducers = dropped,
                "Subscription failed to start, key disabled: {}",
                error
            );
        }

        failures
    }

    /// Stop every subscription; they can be started again later
    pub fn stop_subscriptions(&self) {
        for subscription in self.subscriptions.lock().values_mut() {
            subscription.stop();
        }
    }

    /// Spawn the processing thread
    pub fn start_listening(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock();
        if let Some(current) = worker.take() {
            if !current.handle.is_finished() {
                *worker = Some(current);
                return Err(EngineError::AlreadyListening);
            }
            if current.handle.join().is_err() {
                tracing::warn!("Previous processing thread had panicked");
            }
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || shared.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                EngineError::WorkerSpawn {
                    reason: e.to_string(),
                }
            })?;

        *worker = Some(Worker {
            handle,
            cancelled: false,
        });
        tracing::info!("State coordinator listening");
        Ok(())
    }

    /// Stop the processing thread, waiting up to `timeout` for it to exit
    ///
    /// Events still queued are discarded. On timeout the thread is left
    /// running detached and `StopTimedOut` is returned; calling again keeps
    /// waiting for the same thread.
    pub fn stop_listening(&self, timeout: Duration) -> Result<(), EngineError> {
        self.shared.running.store(false, Ordering::SeqCst);

        let mut worker = match self.worker.lock().take() {
            Some(worker) => worker,
            None => return Ok(()),
        };
        if !worker.cancelled {
            self.shared.bus.cancel();
            worker.cancelled = true;
        }

        let deadline = Instant::now() + timeout;
        while !worker.handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Processing thread still busy after {}ms, leaving it detached",
                    timeout.as_millis()
                );
                *self.worker.lock() = Some(worker);
                return Err(EngineError::StopTimedOut {
                    timeout_ms: whole_millis(timeout),
                });
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        worker
            .handle
            .join()
            .map_err(|_| EngineError::WorkerPanicked)?;
        tracing::info!("State coordinator stopped listening");
        Ok(())
    }

    /// Stop listening, stop subscriptions and stop the poller
    pub fn shutdown(&self) -> Result<(), EngineError> {
        let stopped = self.stop_listening(self.settings.stop_timeout());
        self.stop_subscriptions();
        self.poller.shutdown();
        stopped
    }

    /// Queue an event as if a subscription had delivered it
    pub fn push_event(&self, event: impl Into<GenericEvent>) {
        self.shared.bus.push(event);
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<S> {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified of every state replacement
    pub fn watch_state(&self) -> watch::Receiver<Arc<S>> {
        self.shared.state.subscribe()
    }

    /// Whether the processing thread is running and accepting events
    pub fn is_listening(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && self.is_worker_alive()
    }

    /// Whether a processing thread exists and has not exited
    pub fn is_worker_alive(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Event bus, for latency diagnostics and direct inspection
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    /// Shared attribute poller
    pub fn poller(&self) -> &Arc<AttributePoller> {
        &self.poller
    }

    /// Settings in effect
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Keys with a subscription, active or not
    pub fn subscription_keys(&self) -> Vec<RoutingKey> {
        self.subscriptions.lock().keys().cloned().collect()
    }

    /// Whether the subscription for `key` is running
    pub fn is_subscribed(&self, key: &RoutingKey) -> bool {
        self.subscriptions
            .lock()
            .get(key)
            .is_some_and(|subscription| subscription.is_active())
    }

    /// Number of reducers for `key`
    pub fn reducer_count(&self, key: &RoutingKey) -> usize {
        self.shared.reducers.count(key)
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.shared.publishers.lock().len()
    }
}

impl<S> Drop for StateCoordinator<S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.get_mut() {
            if !worker.cancelled && !worker.handle.is_finished() {
                self.shared.bus.cancel();
                worker.cancelled = true;
            }
        }
    }
}

impl<S> std::fmt::Debug for StateCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCoordinator")
            .field("subscriptions", &self.subscriptions.lock().len())
            .field("observers", &self.shared.publishers.lock().len())
            .field("queued", &self.shared.bus.len())
            .field("running", &self.shared.running.load(Ordering::SeqCst))
            .finish()
    }
}
