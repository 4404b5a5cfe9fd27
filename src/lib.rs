//! # FleetState
//!
//! Reactive state aggregation over a fleet of remote devices.
//!
//! Device attribute changes (delivered by the device itself or sampled by a
//! shared poller) and in-process actions flow through one event queue into a
//! single processing thread. Reducers fold each event into a new immutable
//! state value; memoized selectors project it and observers are notified only
//! when a projection changes.
//!
//! ## Architecture
//!
//! FleetState is organized as a workspace with multiple crates:
//!
//! 1. **fleetstate-core** - Event data model, handles, errors, event bus
//! 2. **fleetstate-settings** - Engine settings (TOML/JSON, environment overrides)
//! 3. **fleetstate-devices** - Device facade, attribute poller, subscriptions
//! 4. **fleetstate-engine** - Reducers, selectors, publishers, state coordinator
//! 5. **fleetstate** - Facade re-exports, logging setup and the demo binary

pub use fleetstate_core::{
    Action, AttrValue, BusError, DeviceError, DeviceHandle, EngineError, Event, EventBus, EventKey,
    GenericEvent, ObserverId, ProducerId, ReducerId, RoutingKey, SinkId,
};

pub use fleetstate_devices::{
    ActionProducer, AttributePoller, Device, DeviceDirectory, PushSupport, SimulatedDevice,
    SimulatedDirectory, Subscription, SubscriptionFactory, SubscriptionMode,
};

pub use fleetstate_engine::{
    derived, root, selector, ActionsReducer, EventsReducer, Publish, Publisher, Reducer, Select,
    StateCoordinator,
};

pub use fleetstate_settings::{EngineSettings, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support (INFO when unset)
/// - Thread names and ids, so poller and coordinator output can be told apart
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::Pretty)
}

/// Initialize logging with an explicit output format
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stdout)
                    .with_thread_names(true)
                    .json(),
            )
            .try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}
