//! Error handling for FleetState
//!
//! Provides error types for all layers of the engine:
//! - Device errors (resolution, sampling, subscription setup)
//! - Engine errors (processing thread lifecycle)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Device error type
///
/// Represents failures talking to a device through the access facade,
/// including name resolution, attribute reads and change subscriptions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device name cannot be resolved by the facade
    #[error("Unable to find device '{device}'")]
    UnableToFindDevice {
        /// The device name that could not be resolved.
        device: String,
    },

    /// An attribute read failed during a poll tick
    #[error("Unable to poll {device}:{attr}: {reason}")]
    UnableToPollDevice {
        /// The device being sampled.
        device: String,
        /// The attribute being sampled.
        attr: String,
        /// Why the read failed.
        reason: String,
    },

    /// Both the push registration and the poll-mode retry failed
    #[error("Unable to start subscription for {device}:{attr}: {reason}")]
    UnableToStartSubscription {
        /// The device of the subscription.
        device: String,
        /// The attribute of the subscription.
        attr: String,
        /// The last failure reported by the device.
        reason: String,
    },

    /// The device does not expose the attribute
    #[error("Attribute '{attr}' not found on device '{device}'")]
    AttributeNotFound {
        /// The device that was queried.
        device: String,
        /// The missing attribute name.
        attr: String,
    },

    /// The device has no change notification configured for the attribute
    #[error("Change events not configured for {device}:{attr}")]
    PushUnsupported {
        /// The device that rejected the registration.
        device: String,
        /// The attribute that has no change events.
        attr: String,
    },

    /// Reading the attribute failed
    #[error("Read of {device}:{attr} failed: {reason}")]
    ReadFailed {
        /// The device that was read.
        device: String,
        /// The attribute that was read.
        attr: String,
        /// The failure reported by the device.
        reason: String,
    },
}

impl DeviceError {
    /// Device name this error refers to
    pub fn device(&self) -> &str {
        match self {
            DeviceError::UnableToFindDevice { device }
            | DeviceError::UnableToPollDevice { device, .. }
            | DeviceError::UnableToStartSubscription { device, .. }
            | DeviceError::AttributeNotFound { device, .. }
            | DeviceError::PushUnsupported { device, .. }
            | DeviceError::ReadFailed { device, .. } => device,
        }
    }

    /// Wrap a read failure as a poll-tick failure
    pub fn into_poll_error(self, device: &str, attr: &str) -> DeviceError {
        DeviceError::UnableToPollDevice {
            device: device.to_string(),
            attr: attr.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Engine error type
///
/// Lifecycle failures of the state coordinator's processing thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start_listening` was called while the processing thread is running
    #[error("Coordinator is already listening")]
    AlreadyListening,

    /// The processing thread did not finish within the join timeout
    #[error("Processing thread did not stop within {timeout_ms}ms")]
    StopTimedOut {
        /// The join timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The processing thread terminated by panicking
    #[error("Processing thread panicked")]
    WorkerPanicked,

    /// The processing thread could not be spawned
    #[error("Failed to spawn processing thread: {reason}")]
    WorkerSpawn {
        /// The OS error message.
        reason: String,
    },
}
