//! In-memory device implementation
//!
//! Used by tests and the demo binary in place of a real control system.
//! Attribute values are set directly; push support, device-side polling and
//! read failures can be configured per device.

use fleetstate_core::{AttrValue, ChangeCallback, DeviceError, DeviceHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Device, DeviceDirectory};

/// How a simulated device answers change registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSupport {
    /// Every attribute produces change events
    Native,
    /// Change events only after device-side polling is configured
    AfterPollingConfigured,
    /// Change registrations always fail
    Never,
}

/// A device whose attributes live in memory
pub struct SimulatedDevice {
    name: String,
    attributes: RwLock<HashMap<String, AttrValue>>,
    push: Mutex<PushSupport>,
    polled: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashMap<String, String>>,
    callbacks: Mutex<HashMap<DeviceHandle, (String, ChangeCallback)>>,
    reads: AtomicUsize,
}

impl SimulatedDevice {
    /// Create a device with native change events and no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: RwLock::new(HashMap::new()),
            push: Mutex::new(PushSupport::Native),
            polled: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
        }
    }

    /// Builder-style attribute initialisation
    pub fn with_attribute(self, attr: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.write().insert(attr.into(), value);
        self
    }

    /// Builder-style push support
    pub fn with_push_support(self, support: PushSupport) -> Self {
        *self.push.lock() = support;
        self
    }

    /// Change push support at runtime
    pub fn set_push_support(&self, support: PushSupport) {
        *self.push.lock() = support;
    }

    /// Set an attribute; registered callbacks fire when the value changes
    pub fn set_attribute(&self, attr: &str, value: AttrValue) {
        let changed = {
            let mut attributes = self.attributes.write();
            attributes.insert(attr.to_string(), value.clone()) != Some(value.clone())
        };
        if changed {
            for callback in self.callbacks_for(attr) {
                callback(Ok(value.clone()));
            }
        }
    }

    /// Report an error to the change callbacks of an attribute
    pub fn emit_error(&self, attr: &str, reason: impl Into<String>) {
        let error = DeviceError::ReadFailed {
            device: self.name.clone(),
            attr: attr.to_string(),
            reason: reason.into(),
        };
        for callback in self.callbacks_for(attr) {
            callback(Err(error.clone()));
        }
    }

    /// Make reads of an attribute fail until [`SimulatedDevice::clear_failure`]
    pub fn fail_reads(&self, attr: &str, reason: impl Into<String>) {
        self.failing.lock().insert(attr.to_string(), reason.into());
    }

    /// Restore normal reads of an attribute
    pub fn clear_failure(&self, attr: &str) {
        self.failing.lock().remove(attr);
    }

    /// Device-side polling period configured for an attribute
    pub fn polling_period(&self, attr: &str) -> Option<u64> {
        self.polled.lock().get(attr).copied()
    }

    /// Number of change callbacks registered for an attribute
    pub fn callback_count(&self, attr: &str) -> usize {
        self.callbacks
            .lock()
            .values()
            .filter(|(name, _)| name == attr)
            .count()
    }

    /// Total attribute reads served (successful or not)
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn callbacks_for(&self, attr: &str) -> Vec<ChangeCallback> {
        self.callbacks
            .lock()
            .values()
            .filter(|(name, _)| name == attr)
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    fn ensure_attribute(&self, attr: &str) -> Result<(), DeviceError> {
        if self.attributes.read().contains_key(attr) {
            Ok(())
        } else {
            Err(DeviceError::AttributeNotFound {
                device: self.name.clone(),
                attr: attr.to_string(),
            })
        }
    }
}

impl Device for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_attribute(&self, attr: &str) -> Result<AttrValue, DeviceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failing.lock().get(attr) {
            return Err(DeviceError::ReadFailed {
                device: self.name.clone(),
                attr: attr.to_string(),
                reason: reason.clone(),
            });
        }
        self.attributes
            .read()
            .get(attr)
            .cloned()
            .ok_or_else(|| DeviceError::AttributeNotFound {
                device: self.name.clone(),
                attr: attr.to_string(),
            })
    }

    fn subscribe_change(
        &self,
        attr: &str,
        _fallback_poll_ms: u64,
        callback: ChangeCallback,
    ) -> Result<DeviceHandle, DeviceError> {
        self.ensure_attribute(attr)?;

        let accepted = match *self.push.lock() {
            PushSupport::Native => true,
            PushSupport::AfterPollingConfigured => self.polled.lock().contains_key(attr),
            PushSupport::Never => false,
        };
        if !accepted {
            return Err(DeviceError::PushUnsupported {
                device: self.name.clone(),
                attr: attr.to_string(),
            });
        }

        let handle = DeviceHandle::new();
        self.callbacks
            .lock()
            .insert(handle, (attr.to_string(), callback));
        tracing::debug!("{}: change callback {} registered for {}", self.name, handle, attr);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: DeviceHandle) -> Result<(), DeviceError> {
        self.callbacks.lock().remove(&handle);
        Ok(())
    }

    fn configure_polling(&self, attr: &str, period_ms: u64) -> Result<(), DeviceError> {
        self.ensure_attribute(attr)?;
        self.polled.lock().insert(attr.to_string(), period_ms);
        Ok(())
    }
}

/// Name-indexed collection of simulated devices
#[derive(Default)]
pub struct SimulatedDirectory {
    devices: RwLock<HashMap<String, Arc<SimulatedDevice>>>,
    offline: Mutex<HashSet<String>>,
}

impl SimulatedDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing any device with the same name
    pub fn add_device(&self, device: SimulatedDevice) -> Arc<SimulatedDevice> {
        let device = Arc::new(device);
        self.devices
            .write()
            .insert(device.name.clone(), device.clone());
        device
    }

    /// Typed access to a registered device
    pub fn simulated(&self, name: &str) -> Option<Arc<SimulatedDevice>> {
        self.devices.read().get(name).cloned()
    }

    /// Make name resolution fail for a device
    pub fn set_offline(&self, name: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }
}

impl DeviceDirectory for SimulatedDirectory {
    fn device(&self, name: &str) -> Result<Arc<dyn Device>, DeviceError> {
        let not_found = || DeviceError::UnableToFindDevice {
            device: name.to_string(),
        };
        if self.offline.lock().contains(name) {
            return Err(not_found());
        }
        self.devices
            .read()
            .get(name)
            .cloned()
            .map(|device| device as Arc<dyn Device>)
            .ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstate_core::thread_safe_vec;
    use serde_json::json;

    #[test]
    fn test_read_and_set() {
        let device = SimulatedDevice::new("d1").with_attribute("state", json!("OFF"));
        assert_eq!(device.read_attribute("state"), Ok(json!("OFF")));

        device.set_attribute("state", json!("ON"));
        assert_eq!(device.read_attribute("state"), Ok(json!("ON")));
        assert_eq!(device.read_count(), 2);

        assert!(matches!(
            device.read_attribute("missing"),
            Err(DeviceError::AttributeNotFound { .. })
        ));
    }

    #[test]
    fn test_callbacks_fire_on_change_only() {
        let device = SimulatedDevice::new("d1").with_attribute("state", json!("OFF"));
        let seen = thread_safe_vec();
        let callback: ChangeCallback = {
            let seen = seen.clone();
            Arc::new(move |value| seen.lock().push(value))
        };
        let handle = device
            .subscribe_change("state", 3000, callback)
            .expect("subscribe");

        device.set_attribute("state", json!("ON"));
        device.set_attribute("state", json!("ON"));
        device.emit_error("state", "offline");
        assert_eq!(seen.lock().len(), 2);
        assert!(seen.lock()[1].is_err());

        device.unsubscribe(handle).expect("unsubscribe");
        device.set_attribute("state", json!("OFF"));
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(device.callback_count("state"), 0);
    }

    #[test]
    fn test_push_requires_polling_when_configured() {
        let device = SimulatedDevice::new("d1")
            .with_attribute("temp", json!(20.0))
            .with_push_support(PushSupport::AfterPollingConfigured);
        let callback: ChangeCallback = Arc::new(|_| {});

        assert!(matches!(
            device.subscribe_change("temp", 3000, callback.clone()),
            Err(DeviceError::PushUnsupported { .. })
        ));

        device.configure_polling("temp", 100).expect("configure");
        assert_eq!(device.polling_period("temp"), Some(100));
        assert!(device.subscribe_change("temp", 3000, callback).is_ok());
    }

    #[test]
    fn test_failing_reads() {
        let device = SimulatedDevice::new("d1").with_attribute("temp", json!(1));
        device.fail_reads("temp", "timeout");
        assert!(matches!(
            device.read_attribute("temp"),
            Err(DeviceError::ReadFailed { .. })
        ));
        device.clear_failure("temp");
        assert!(device.read_attribute("temp").is_ok());
    }

    #[test]
    fn test_directory_lookup() {
        let directory = SimulatedDirectory::new();
        directory.add_device(SimulatedDevice::new("d1"));

        assert!(directory.device("d1").is_ok());
        assert!(matches!(
            directory.device("D1"),
            Err(DeviceError::UnableToFindDevice { .. })
        ));

        directory.set_offline("d1", true);
        assert!(directory.device("d1").is_err());
        directory.set_offline("d1", false);
        assert_eq!(directory.device("d1").map(|d| d.name().to_string()), Ok("d1".to_string()));
    }
}
