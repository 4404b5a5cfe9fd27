use fleetstate_core::{
    ChangeCallback, DeviceError, DeviceHandle, Event, EventKey, GenericEvent, GenericEventSink,
    RoutingKey,
};
use std::sync::Arc;

use super::{Subscription, SubscriptionMode};
use crate::device::{Device, DeviceDirectory};

/// Subscription using the device's own change notification
///
/// If the first registration is rejected, device-side polling is configured
/// with a short period and registration is retried once.
pub struct PushSubscription {
    key: EventKey,
    directory: Arc<dyn DeviceDirectory>,
    fallback_poll_ms: u64,
    fast_poll_ms: u64,
    active: Option<(Arc<dyn Device>, DeviceHandle)>,
}

impl PushSubscription {
    /// Create an inactive push subscription
    pub fn new(
        key: EventKey,
        directory: Arc<dyn DeviceDirectory>,
        fallback_poll_ms: u64,
        fast_poll_ms: u64,
    ) -> Self {
        Self {
            key,
            directory,
            fallback_poll_ms,
            fast_poll_ms,
            active: None,
        }
    }

    fn change_callback(&self, sink: GenericEventSink) -> ChangeCallback {
        let key = self.key.clone();
        Arc::new(move |change| {
            let event = match change {
                Ok(value) => Event::new(key.clone(), value),
                Err(e) => Event::error(key.clone(), e.to_string()),
            };
            sink(GenericEvent::Device(event));
        })
    }

    fn register(
        &self,
        device: &Arc<dyn Device>,
        callback: ChangeCallback,
    ) -> Result<DeviceHandle, DeviceError> {
        let attr = &self.key.attr;
        match device.subscribe_change(attr, self.fallback_poll_ms, callback.clone()) {
            Ok(handle) => Ok(handle),
            Err(first) => {
                tracing::warn!(
                    device = %self.key.device,
                    attr = %attr,
                    "Push registration failed ({}), retrying with {}ms device polling",
                    first,
                    self.fast_poll_ms
                );
                device
                    .configure_polling(attr, self.fast_poll_ms)
                    .and_then(|_| device.subscribe_change(attr, self.fallback_poll_ms, callback))
                    .map_err(|e| DeviceError::UnableToStartSubscription {
                        device: self.key.device.clone(),
                        attr: attr.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

impl Subscription for PushSubscription {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey::Attribute(self.key.clone())
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Push
    }

    fn start(&mut self, sink: GenericEventSink) -> Result<(), DeviceError> {
        if self.active.is_some() {
            return Ok(());
        }

        let device = self.directory.device(&self.key.device)?;
        let handle = self.register(&device, self.change_callback(sink.clone()))?;

        match device.read_attribute(&self.key.attr) {
            Ok(value) => sink(GenericEvent::Device(Event::new(self.key.clone(), value))),
            Err(e) => {
                if let Err(unsubscribe) = device.unsubscribe(handle) {
                    tracing::warn!("{}: unsubscribe after failed read: {}", self.key, unsubscribe);
                }
                return Err(e);
            }
        }

        tracing::debug!("{} subscribed via push ({})", self.key, handle);
        self.active = Some((device, handle));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((device, handle)) = self.active.take() {
            if let Err(e) = device.unsubscribe(handle) {
                tracing::warn!(device = %self.key.device, attr = %self.key.attr, "Unsubscribe failed: {}", e);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
