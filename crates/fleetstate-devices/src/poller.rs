//! Attribute poller
//!
//! Bridges devices without push notification into the event pipeline. One
//! background thread samples every registered `(device, attribute)` pair on a
//! fixed interval and delivers an [`Event`] to the attribute's sinks whenever
//! the sampled value differs from the last one seen.
//!
//! Registration reads the current value synchronously and hands it to the
//! new sink before returning, so consumers never wait a full interval for
//! their first value.

use fleetstate_core::{
    AttrValue, DeviceError, Event, EventSink, PolledAttribute, SinkId,
};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::device::DeviceDirectory;

/// Default sampling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Last known value and registered sinks of one polled attribute
#[derive(Default)]
pub struct PollingState {
    last_value: Option<AttrValue>,
    // bumped whenever last_value is stored
    generation: u64,
    sinks: Vec<(SinkId, EventSink)>,
}

impl PollingState {
    /// Last value read from the device
    pub fn last_value(&self) -> Option<&AttrValue> {
        self.last_value.as_ref()
    }

    /// Number of sinks receiving changes
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    fn sinks(&self) -> Vec<EventSink> {
        self.sinks.iter().map(|(_, sink)| sink.clone()).collect()
    }

    fn store(&mut self, value: AttrValue) {
        self.last_value = Some(value);
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Default)]
struct Registry {
    attributes: HashMap<PolledAttribute, PollingState>,
    sink_owners: HashMap<SinkId, PolledAttribute>,
}

struct PollerShared {
    directory: Arc<dyn DeviceDirectory>,
    registry: Mutex<Registry>,
    interval: Duration,
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl PollerShared {
    fn poll_once(&self) {
        let keys: Vec<(PolledAttribute, u64)> = self
            .registry
            .lock()
            .attributes
            .iter()
            .map(|(key, state)| (key.clone(), state.generation))
            .collect();

        for (key, generation) in keys {
            let read = self
                .directory
                .device(&key.device)
                .and_then(|device| device.read_attribute(&key.attr));

            let value = match read {
                Ok(value) => value,
                Err(e) => {
                    let error = e.into_poll_error(&key.device, &key.attr);
                    tracing::warn!(device = %key.device, attr = %key.attr, "{}", error);
                    continue;
                }
            };

            let sinks = {
                let mut registry = self.registry.lock();
                let Some(state) = registry.attributes.get_mut(&key) else {
                    continue;
                };
                // A newer value was stored while this read was in flight
                if state.generation != generation {
                    tracing::trace!("Dropping stale sample of {}", key);
                    continue;
                }
                if state.last_value.as_ref() == Some(&value) {
                    continue;
                }
                state.store(value.clone());
                state.sinks()
            };

            tracing::debug!("{} changed to {}", key, value);
            let event = Event::new(key, value);
            for sink in sinks {
                sink(event.clone());
            }
        }
    }

    fn run(&self) {
        tracing::debug!("Attribute poller started ({:?} interval)", self.interval);
        loop {
            {
                let mut stopped = self.stopped.lock();
                if !*stopped {
                    self.wake.wait_for(&mut stopped, self.interval);
                }
                if *stopped {
                    break;
                }
            }
            self.poll_once();
        }
        tracing::debug!("Attribute poller stopped");
    }
}

/// Shared sampler for every polled attribute of one engine
pub struct AttributePoller {
    shared: Arc<PollerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AttributePoller {
    /// Create a poller with the default interval
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self::with_interval(directory, DEFAULT_POLL_INTERVAL)
    }

    /// Create a poller sampling every `interval`
    pub fn with_interval(directory: Arc<dyn DeviceDirectory>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                directory,
                registry: Mutex::new(Registry::default()),
                interval,
                stopped: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Register a sink for changes of `key`
    ///
    /// The current value is read and delivered to `sink` before this
    /// returns. Resolution and read failures propagate and leave nothing
    /// registered. The sink runs under the registry lock here and must not
    /// call back into the poller.
    pub fn add_subscription(
        &self,
        key: PolledAttribute,
        sink: EventSink,
    ) -> Result<SinkId, DeviceError> {
        let id = SinkId::new();
        {
            let mut registry = self.shared.registry.lock();
            let device = self.shared.directory.device(&key.device)?;
            let value = device.read_attribute(&key.attr)?;
            let event = Event::new(key.clone(), value.clone());

            sink(event.clone());

            let state = registry.attributes.entry(key.clone()).or_default();
            if state.last_value.is_some() && state.last_value.as_ref() != Some(&value) {
                for existing in state.sinks() {
                    existing(event.clone());
                }
            }
            // Stored even when unchanged so samples read before this one are dropped
            state.store(value);
            state.sinks.push((id, sink));
            registry.sink_owners.insert(id, key.clone());
        }
        tracing::debug!("Polling {} for sink {}", key, id);

        self.ensure_running();
        Ok(id)
    }

    /// Remove a sink
    ///
    /// The attribute stays tracked; with no sinks left nothing is delivered.
    pub fn remove_subscription(&self, id: SinkId) -> bool {
        let mut registry = self.shared.registry.lock();
        let Some(key) = registry.sink_owners.remove(&id) else {
            return false;
        };
        if let Some(state) = registry.attributes.get_mut(&key) {
            state.sinks.retain(|(sink_id, _)| *sink_id != id);
        }
        tracing::debug!("Sink {} no longer polling {}", id, key);
        true
    }

    /// Sample every tracked attribute once on the calling thread
    pub fn poll_now(&self) {
        self.shared.poll_once();
    }

    /// Attributes currently tracked
    pub fn tracked_attributes(&self) -> Vec<PolledAttribute> {
        let mut keys: Vec<_> = self
            .shared
            .registry
            .lock()
            .attributes
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of sinks registered for an attribute
    pub fn sink_count(&self, key: &PolledAttribute) -> usize {
        self.shared
            .registry
            .lock()
            .attributes
            .get(key)
            .map_or(0, PollingState::sink_count)
    }

    /// Last value seen for an attribute
    pub fn last_value(&self, key: &PolledAttribute) -> Option<AttrValue> {
        self.shared
            .registry
            .lock()
            .attributes
            .get(key)
            .and_then(|state| state.last_value.clone())
    }

    /// Sampling interval
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Whether the sampling thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop and join the sampling thread
    pub fn shutdown(&self) {
        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Attribute poller thread panicked");
            }
        }
    }

    fn ensure_running(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() || *self.shared.stopped.lock() {
            return;
        }
        let shared = self.shared.clone();
        match std::thread::Builder::new()
            .name("attribute-poller".to_string())
            .spawn(move || shared.run())
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => tracing::error!("Failed to spawn attribute poller: {}", e),
        }
    }
}

impl Drop for AttributePoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AttributePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributePoller")
            .field("interval", &self.shared.interval)
            .field("tracked", &self.shared.registry.lock().attributes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedDevice, SimulatedDirectory};
    use fleetstate_core::{thread_safe_vec, EventKey, ThreadSafeVec};
    use serde_json::json;
    use std::time::Instant;

    fn collector() -> (ThreadSafeVec<Event>, EventSink) {
        let events = thread_safe_vec();
        let sink: EventSink = {
            let events = events.clone();
            Arc::new(move |event| events.lock().push(event))
        };
        (events, sink)
    }

    fn setup() -> (Arc<SimulatedDirectory>, Arc<SimulatedDevice>, AttributePoller) {
        let directory = Arc::new(SimulatedDirectory::new());
        let device = directory.add_device(
            SimulatedDevice::new("d1")
                .with_attribute("attr", json!("UNKNOWN"))
                .with_attribute("temp", json!(20)),
        );
        let poller = AttributePoller::with_interval(directory.clone(), Duration::from_secs(60));
        (directory, device, poller)
    }

    #[test]
    fn test_initial_value_delivered_synchronously() {
        let (_directory, _device, poller) = setup();
        let (events, sink) = collector();

        let start = Instant::now();
        poller
            .add_subscription(EventKey::new("d1", "attr"), sink)
            .expect("subscribe");

        assert!(start.elapsed() < Duration::from_millis(100));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value(), &json!("UNKNOWN"));
        assert!(poller.is_running());
    }

    #[test]
    fn test_tick_delivers_only_changes() {
        let (_directory, device, poller) = setup();
        let (events, sink) = collector();
        poller
            .add_subscription(EventKey::new("d1", "attr"), sink)
            .expect("subscribe");

        poller.poll_now();
        assert_eq!(events.lock().len(), 1);

        device.set_attribute("attr", json!("ON"));
        poller.poll_now();
        poller.poll_now();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].value(), &json!("ON"));
    }

    #[test]
    fn test_initial_read_failure_propagates() {
        let (_directory, device, poller) = setup();
        let (_, sink) = collector();

        device.fail_reads("attr", "timeout");
        assert!(matches!(
            poller.add_subscription(EventKey::new("d1", "attr"), sink.clone()),
            Err(DeviceError::ReadFailed { .. })
        ));
        assert!(matches!(
            poller.add_subscription(EventKey::new("nope", "attr"), sink),
            Err(DeviceError::UnableToFindDevice { .. })
        ));
        assert!(poller.tracked_attributes().is_empty());
    }

    #[test]
    fn test_read_failure_is_isolated_per_attribute() {
        let (_directory, device, poller) = setup();
        let (attr_events, attr_sink) = collector();
        let (temp_events, temp_sink) = collector();
        poller
            .add_subscription(EventKey::new("d1", "attr"), attr_sink)
            .expect("subscribe attr");
        poller
            .add_subscription(EventKey::new("d1", "temp"), temp_sink)
            .expect("subscribe temp");

        device.fail_reads("attr", "timeout");
        device.set_attribute("temp", json!(25));
        poller.poll_now();

        assert_eq!(attr_events.lock().len(), 1);
        assert_eq!(temp_events.lock().len(), 2);
    }

    #[test]
    fn test_removed_sink_stops_delivery_but_tracking_continues() {
        let (_directory, device, poller) = setup();
        let (events, sink) = collector();
        let key = EventKey::new("d1", "attr");
        let id = poller.add_subscription(key.clone(), sink).expect("subscribe");

        assert!(poller.remove_subscription(id));
        assert!(!poller.remove_subscription(id));

        device.set_attribute("attr", json!("ON"));
        poller.poll_now();

        assert_eq!(events.lock().len(), 1);
        assert_eq!(poller.tracked_attributes(), vec![key.clone()]);
        assert_eq!(poller.sink_count(&key), 0);
        assert_eq!(poller.last_value(&key), Some(json!("ON")));
    }

    #[test]
    fn test_background_thread_samples() {
        let directory = Arc::new(SimulatedDirectory::new());
        let device = directory.add_device(SimulatedDevice::new("d1").with_attribute("attr", json!(0)));
        let poller = AttributePoller::with_interval(directory, Duration::from_millis(10));
        let (events, sink) = collector();
        poller
            .add_subscription(EventKey::new("d1", "attr"), sink)
            .expect("subscribe");

        device.set_attribute("attr", json!(1));
        let deadline = Instant::now() + Duration::from_secs(2);
        while events.lock().len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(events.lock().len(), 2);

        poller.shutdown();
        assert!(!poller.is_running());
    }
}
