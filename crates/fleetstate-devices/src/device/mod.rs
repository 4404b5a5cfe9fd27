//! Device access facade
//!
//! The engine depends on nothing beyond this surface: resolve a device by
//! name, read an attribute, register and drop change callbacks, and ask the
//! device to sample an attribute itself so change events can be produced.
//!
//! Connection setup and protocol details live behind implementations of
//! these traits.

pub mod simulated;

use fleetstate_core::{AttrValue, ChangeCallback, DeviceError, DeviceHandle};
use std::sync::Arc;

pub use simulated::{PushSupport, SimulatedDevice, SimulatedDirectory};

/// One remote device exposing named attributes
pub trait Device: Send + Sync {
    /// Device name as known to the directory
    fn name(&self) -> &str;

    /// Read the current value of an attribute
    fn read_attribute(&self, attr: &str) -> Result<AttrValue, DeviceError>;

    /// Register a callback invoked whenever the attribute changes
    ///
    /// `fallback_poll_ms` is the period the device may use to sample the
    /// attribute itself when it has no native change source.
    fn subscribe_change(
        &self,
        attr: &str,
        fallback_poll_ms: u64,
        callback: ChangeCallback,
    ) -> Result<DeviceHandle, DeviceError>;

    /// Drop a callback registered with [`Device::subscribe_change`]
    fn unsubscribe(&self, handle: DeviceHandle) -> Result<(), DeviceError>;

    /// Configure device-side sampling of an attribute
    fn configure_polling(&self, attr: &str, period_ms: u64) -> Result<(), DeviceError>;
}

/// Resolves device names to devices
pub trait DeviceDirectory: Send + Sync {
    /// Look up a device; fails with [`DeviceError::UnableToFindDevice`]
    fn device(&self, name: &str) -> Result<Arc<dyn Device>, DeviceError>;
}
