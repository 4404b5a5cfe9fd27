//! Poll ticks racing with sink registration

use fleetstate_core::{
    thread_safe_vec, AttrValue, ChangeCallback, DeviceError, DeviceHandle, Event, EventKey,
    EventSink, ThreadSafeVec,
};
use fleetstate_devices::{AttributePoller, Device, DeviceDirectory};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Device whose next read can be held after the value was sampled
struct GatedDevice {
    value: Mutex<AttrValue>,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl GatedDevice {
    fn new(value: AttrValue) -> Self {
        Self {
            value: Mutex::new(value),
            gate: Mutex::new(None),
        }
    }

    fn set(&self, value: AttrValue) {
        *self.value.lock() = value;
    }

    /// Hold the next read; returns (sampled, release)
    fn hold_next_read(&self) -> (Receiver<()>, Sender<()>) {
        let (sampled_tx, sampled_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock() = Some((sampled_tx, release_rx));
        (sampled_rx, release_tx)
    }
}

impl Device for GatedDevice {
    fn name(&self) -> &str {
        "gated"
    }

    fn read_attribute(&self, _attr: &str) -> Result<AttrValue, DeviceError> {
        let value = self.value.lock().clone();
        let gate = self.gate.lock().take();
        if let Some((sampled, release)) = gate {
            let _ = sampled.send(());
            let _ = release.recv();
        }
        Ok(value)
    }

    fn subscribe_change(
        &self,
        attr: &str,
        _fallback_poll_ms: u64,
        _callback: ChangeCallback,
    ) -> Result<DeviceHandle, DeviceError> {
        Err(DeviceError::PushUnsupported {
            device: self.name().to_string(),
            attr: attr.to_string(),
        })
    }

    fn unsubscribe(&self, _handle: DeviceHandle) -> Result<(), DeviceError> {
        Ok(())
    }

    fn configure_polling(&self, _attr: &str, _period_ms: u64) -> Result<(), DeviceError> {
        Ok(())
    }
}

struct GatedDirectory(Arc<GatedDevice>);

impl DeviceDirectory for GatedDirectory {
    fn device(&self, name: &str) -> Result<Arc<dyn Device>, DeviceError> {
        if name == "gated" {
            Ok(self.0.clone())
        } else {
            Err(DeviceError::UnableToFindDevice {
                device: name.to_string(),
            })
        }
    }
}

fn collector() -> (ThreadSafeVec<Event>, EventSink) {
    let events = thread_safe_vec();
    let sink: EventSink = {
        let events = events.clone();
        Arc::new(move |event| events.lock().push(event))
    };
    (events, sink)
}

fn values(events: &ThreadSafeVec<Event>) -> Vec<AttrValue> {
    events.lock().iter().map(|e| e.value().clone()).collect()
}

fn setup(initial: AttrValue) -> (Arc<GatedDevice>, Arc<AttributePoller>) {
    let device = Arc::new(GatedDevice::new(initial));
    let poller = Arc::new(AttributePoller::with_interval(
        Arc::new(GatedDirectory(device.clone())),
        Duration::from_secs(3600),
    ));
    (device, poller)
}

#[test]
fn test_tick_sample_older_than_registration_is_dropped() {
    let (device, poller) = setup(json!("A"));
    let key = EventKey::new("gated", "state");
    let (first, first_sink) = collector();
    poller
        .add_subscription(key.clone(), first_sink)
        .expect("subscribe first");

    // the tick samples "A" and is held before it compares
    let (sampled, release) = device.hold_next_read();
    let tick = {
        let poller = poller.clone();
        thread::spawn(move || poller.poll_now())
    };
    sampled
        .recv_timeout(Duration::from_secs(5))
        .expect("tick sampled the device");

    device.set(json!("B"));
    let (second, second_sink) = collector();
    poller
        .add_subscription(key.clone(), second_sink)
        .expect("subscribe second");

    release.send(()).expect("release tick");
    tick.join().expect("tick thread");

    assert_eq!(values(&first), vec![json!("A"), json!("B")]);
    assert_eq!(values(&second), vec![json!("B")]);
    assert_eq!(poller.last_value(&key), Some(json!("B")));
}

#[test]
fn test_tick_sample_dropped_when_registration_reads_cached_value() {
    let (device, poller) = setup(json!("A"));
    let key = EventKey::new("gated", "state");
    let (first, first_sink) = collector();
    poller
        .add_subscription(key.clone(), first_sink)
        .expect("subscribe first");

    // the tick samples a transient "B"; the device is back to "A" by the
    // time the next sink registers
    device.set(json!("B"));
    let (sampled, release) = device.hold_next_read();
    let tick = {
        let poller = poller.clone();
        thread::spawn(move || poller.poll_now())
    };
    sampled
        .recv_timeout(Duration::from_secs(5))
        .expect("tick sampled the device");

    device.set(json!("A"));
    let (_second, second_sink) = collector();
    poller
        .add_subscription(key.clone(), second_sink)
        .expect("subscribe second");

    release.send(()).expect("release tick");
    tick.join().expect("tick thread");

    assert_eq!(values(&first), vec![json!("A")]);
    assert_eq!(poller.last_value(&key), Some(json!("A")));

    // later ticks still pick up real changes
    device.set(json!("C"));
    poller.poll_now();
    assert_eq!(values(&first), vec![json!("A"), json!("C")]);
}
