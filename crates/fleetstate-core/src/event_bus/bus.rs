//! Event Bus implementation.
//!
//! A thread-safe FIFO carrying device events and actions from any number of
//! producers (push callbacks, the attribute poller, action producers) to the
//! single processing thread, plus latency bookkeeping for diagnostics.

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::events::GenericEvent;

/// Default number of latency samples kept for diagnostics
pub const DEFAULT_LATENCY_WINDOW: usize = 100;

/// Queue entry; the cancellation sentinel is never a legitimate event
#[derive(Debug)]
enum BusMessage {
    Event(GenericEvent),
    Cancel,
}

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Number of processed-event latency samples to keep.
    pub latency_window: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            latency_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

/// Error types for event bus operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The cancellation sentinel was dequeued
    #[error("Event bus cancelled")]
    Cancelled,
    /// No event arrived before the timeout
    #[error("Timed out waiting for an event")]
    Timeout,
}

/// Central event queue for one engine instance
pub struct EventBus {
    /// Pending events, oldest first
    queue: Mutex<VecDeque<BusMessage>>,
    /// Signalled on every enqueue
    available: Condvar,
    /// Ring buffer of processing latencies
    latencies: Mutex<VecDeque<Duration>>,
    /// Total number of events recorded as processed
    processed: AtomicU64,
    /// Configuration
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let window = config.latency_window.max(1);
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            latencies: Mutex::new(VecDeque::with_capacity(window)),
            processed: AtomicU64::new(0),
            config: EventBusConfig {
                latency_window: window,
            },
        }
    }

    /// Enqueue an event without blocking
    pub fn push(&self, event: impl Into<GenericEvent>) {
        self.enqueue(BusMessage::Event(event.into()));
    }

    /// Enqueue the cancellation sentinel to unblock a waiting consumer
    pub fn cancel(&self) {
        tracing::debug!("Event bus cancellation requested");
        self.enqueue(BusMessage::Cancel);
    }

    fn enqueue(&self, message: BusMessage) {
        let mut queue = self.queue.lock();
        queue.push_back(message);
        self.available.notify_one();
    }

    /// Block until the next event is available
    ///
    /// With `timeout = None` this waits indefinitely. Returns
    /// [`BusError::Cancelled`] when the sentinel is reached.
    pub fn next(&self, timeout: Option<Duration>) -> Result<GenericEvent, BusError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.queue.lock();
        loop {
            if let Some(message) = queue.pop_front() {
                return match message {
                    BusMessage::Event(event) => Ok(event),
                    BusMessage::Cancel => Err(BusError::Cancelled),
                };
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut queue, deadline).timed_out()
                        && queue.is_empty()
                    {
                        return Err(BusError::Timeout);
                    }
                }
                None => self.available.wait(&mut queue),
            }
        }
    }

    /// Record that an event went through the processing loop
    pub fn record_processed(&self, event: &GenericEvent) {
        let latency = (Utc::now() - event.timestamp())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let mut latencies = self.latencies.lock();
        if latencies.len() == self.config.latency_window {
            latencies.pop_front();
        }
        latencies.push_back(latency);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency of the most recently processed event
    pub fn last_latency(&self) -> Option<Duration> {
        self.latencies.lock().back().copied()
    }

    /// Mean latency over the retained window
    pub fn average_latency(&self) -> Option<Duration> {
        let latencies = self.latencies.lock();
        if latencies.is_empty() {
            return None;
        }
        let total: Duration = latencies.iter().sum();
        Some(total / latencies.len() as u32)
    }

    /// Total number of events recorded as processed
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of queued entries (sentinels included)
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Get the current configuration
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.len())
            .field("processed", &self.processed_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::events::{Action, Event, EventKey, ProducerId};
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn device_event(value: i64) -> Event {
        Event::new(EventKey::new("d1", "attr"), json!(value))
    }

    #[test]
    fn test_push_and_next_fifo() {
        let bus = EventBus::new();
        bus.push(device_event(1));
        bus.push(device_event(2));
        assert_eq!(bus.len(), 2);

        let first = bus.next(None).expect("first event");
        let second = bus.next(None).expect("second event");
        assert_eq!(first.as_device().map(|e| e.value().clone()), Some(json!(1)));
        assert_eq!(second.as_device().map(|e| e.value().clone()), Some(json!(2)));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_next_times_out() {
        let bus = EventBus::new();
        let start = Instant::now();
        assert_eq!(
            bus.next(Some(Duration::from_millis(20))),
            Err(BusError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_unblocks_waiting_consumer() {
        let bus = Arc::new(EventBus::new());
        let consumer = {
            let bus = bus.clone();
            thread::spawn(move || bus.next(None))
        };

        thread::sleep(Duration::from_millis(20));
        bus.cancel();

        let result = consumer.join().expect("consumer thread");
        assert_eq!(result, Err(BusError::Cancelled));
    }

    #[test]
    fn test_sentinel_does_not_collide_with_falsy_values() {
        let bus = EventBus::new();
        bus.push(Event::new(EventKey::new("d1", "flag"), json!(null)));
        bus.push(Action::new(ProducerId::new(), json!(false)));
        bus.cancel();

        assert!(bus.next(None).is_ok());
        assert!(bus.next(None).is_ok());
        assert_eq!(bus.next(None), Err(BusError::Cancelled));
    }

    #[test]
    fn test_latency_bookkeeping() {
        let bus = EventBus::new();
        assert!(bus.last_latency().is_none());
        assert!(bus.average_latency().is_none());

        let event = GenericEvent::from(device_event(1));
        bus.record_processed(&event);
        bus.record_processed(&event);

        assert!(bus.last_latency().is_some());
        assert!(bus.average_latency().is_some());
        assert_eq!(bus.processed_count(), 2);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let bus = EventBus::with_config(EventBusConfig { latency_window: 5 });
        let event = GenericEvent::from(device_event(1));
        for _ in 0..12 {
            bus.record_processed(&event);
        }
        assert_eq!(bus.latencies.lock().len(), 5);
        assert_eq!(bus.processed_count(), 12);
    }
}
