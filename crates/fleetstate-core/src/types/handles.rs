//! Opaque registration handles.
//!
//! Every `subscribe`/`add` style call hands back one of these tokens, and the
//! matching `unsubscribe`/`remove` call takes it back. Handles are UUID-based
//! so they never alias across registries or engine instances.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique handle
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), &self.0.to_string()[..8])
            }
        }
    };
}

define_handle!(
    /// Registration of an event sink with the poller or an action producer
    SinkId,
    "Sink"
);

define_handle!(
    /// Registration of an observer with the state coordinator
    ObserverId,
    "Observer"
);

define_handle!(
    /// Change-callback registration on a device
    DeviceHandle,
    "Device"
);

define_handle!(
    /// Registration of a reducer with the reducer registry
    ReducerId,
    "Reducer"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let a = SinkId::new();
        let b = SinkId::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_handle_display() {
        let id = ObserverId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("Observer("));
        assert_eq!(shown.len(), "Observer()".len() + 8);
    }
}
