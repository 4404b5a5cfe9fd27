//! FleetState Settings Crate
//!
//! Handles engine configuration: sampling and pacing intervals, push/poll
//! mode selection and diagnostics sizing, loaded from TOML or JSON files and
//! overridden from the environment.

pub mod config;
pub mod error;

pub use config::{
    EngineSettings, ENV_FORCE_POLLING, ENV_PACING_MS, ENV_POLL_INTERVAL_MS,
};
pub use error::{SettingsError, SettingsResult};
