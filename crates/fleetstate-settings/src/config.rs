//! Engine configuration
//!
//! Provides configuration file handling and validation for the state engine.
//! Supports JSON and TOML file formats stored in the platform config
//! directory, with environment variables taking precedence.
//!
//! Settings cover:
//! - Attribute sampling (poll interval, fast poll interval for push retries)
//! - Processing loop pacing and shutdown timeout
//! - Push vs forced-poll mode
//! - Latency diagnostics window

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SettingsError, SettingsResult};

/// Forces every device subscription into poll mode when truthy
pub const ENV_FORCE_POLLING: &str = "FLEETSTATE_FORCE_POLLING";

/// Overrides `poll_interval_ms`
pub const ENV_POLL_INTERVAL_MS: &str = "FLEETSTATE_POLL_INTERVAL_MS";

/// Overrides `pacing_interval_ms`
pub const ENV_PACING_MS: &str = "FLEETSTATE_PACING_MS";

const CONFIG_DIR_NAME: &str = "fleetstate";
const CONFIG_FILE_NAME: &str = "engine.toml";

/// Runtime settings for one engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Interval between attribute poller ticks in milliseconds
    pub poll_interval_ms: u64,
    /// Pause after each processed event in milliseconds
    pub pacing_interval_ms: u64,
    /// Device-side poll interval configured before retrying a push registration
    pub fast_poll_interval_ms: u64,
    /// Fallback poll period passed to the device with each push registration
    pub push_fallback_poll_ms: u64,
    /// Default join timeout when stopping the processing thread
    pub stop_timeout_ms: u64,
    /// Number of processed-event latency samples kept
    pub latency_window: usize,
    /// Use the attribute poller for every device subscription
    pub force_polling: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            pacing_interval_ms: 500,
            fast_poll_interval_ms: 100,
            push_fallback_poll_ms: 3000,
            stop_timeout_ms: 5000,
            latency_window: 100,
            force_polling: false,
        }
    }
}

impl EngineSettings {
    /// Create new settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings file location in the platform config directory
    pub fn default_config_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load settings from the default location, falling back to defaults
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default() -> SettingsResult<Self> {
        let mut settings = match Self::default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path)?,
            Ok(_) => Self::default(),
            Err(e) => {
                tracing::debug!("Using default engine settings: {}", e);
                Self::default()
            }
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let settings: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> SettingsResult<()> {
        let positive = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("fast_poll_interval_ms", self.fast_poll_interval_ms),
            ("push_fallback_poll_ms", self.push_fallback_poll_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(SettingsError::InvalidSetting {
                    key: key.to_string(),
                    reason: "must be > 0".to_string(),
                });
            }
        }

        if self.latency_window == 0 {
            return Err(SettingsError::InvalidSetting {
                key: "latency_window".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_FORCE_POLLING) {
            match parse_flag(&raw) {
                Some(flag) => self.force_polling = flag,
                None => tracing::warn!("Ignoring {}={:?}: not a boolean", ENV_FORCE_POLLING, raw),
            }
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => tracing::warn!("Ignoring {}={:?}", ENV_POLL_INTERVAL_MS, raw),
            }
        }

        if let Some(raw) = lookup(ENV_PACING_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.pacing_interval_ms = ms,
                Err(_) => tracing::warn!("Ignoring {}={:?}", ENV_PACING_MS, raw),
            }
        }
    }

    /// Poller tick interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause after each processed event
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    /// Default processing thread join timeout
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.pacing_interval(), Duration::from_millis(500));
        assert_eq!(settings.latency_window, 100);
        assert!(!settings.force_polling);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_force_polling_override() {
        let mut settings = EngineSettings::default();
        settings.apply_overrides_from(lookup(&[(ENV_FORCE_POLLING, "yes")]));
        assert!(settings.force_polling);

        settings.apply_overrides_from(lookup(&[(ENV_FORCE_POLLING, "off")]));
        assert!(!settings.force_polling);

        settings.apply_overrides_from(lookup(&[(ENV_FORCE_POLLING, "maybe")]));
        assert!(!settings.force_polling);
    }

    #[test]
    fn test_interval_overrides() {
        let mut settings = EngineSettings::default();
        settings.apply_overrides_from(lookup(&[
            (ENV_POLL_INTERVAL_MS, "250"),
            (ENV_PACING_MS, "0"),
        ]));
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.pacing_interval_ms, 0);

        settings.apply_overrides_from(lookup(&[(ENV_POLL_INTERVAL_MS, "0")]));
        assert_eq!(settings.poll_interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let settings = EngineSettings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidSetting { ref key, .. }) if key == "poll_interval_ms"
        ));

        let settings = EngineSettings {
            latency_window: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: EngineSettings =
            toml::from_str("force_polling = true\npoll_interval_ms = 750\n").expect("parse");
        assert!(settings.force_polling);
        assert_eq!(settings.poll_interval_ms, 750);
        assert_eq!(settings.pacing_interval_ms, 500);
    }
}
