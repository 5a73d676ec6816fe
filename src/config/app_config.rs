// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application configuration (backend, device, meter and logging).

use crate::audio::{DataFlow, DeviceRole};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which audio platform to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory platform with a scripted set of sessions.
    #[default]
    Simulated,
    /// PipeWire (requires the `pipewire` feature).
    Pipewire,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// List inactive sessions alongside active ones.
    pub show_inactive: bool,
    pub backend: Backend,
    /// How long the simulated scenario runs, in seconds.
    pub scenario_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            show_inactive: false,
            backend: Backend::default(),
            scenario_secs: 30,
        }
    }
}

/// Which default device the mixer attaches to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub flow: DataFlow,
    pub role: DeviceRole,
}

/// Peak meter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Peak refresh rate in Hz.
    pub refresh_hz: u32,
    /// Consecutive failed peak reads after which a session is treated as
    /// expired. Zero disables this.
    pub failure_limit: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            refresh_hz: 60,
            failure_limit: 30,
        }
    }
}

impl MeterConfig {
    /// Time between two peak refreshes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.refresh_hz.clamp(1, 1000)))
    }
}

/// Icon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    /// Icon edge length in pixels.
    pub size: u32,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self { size: 32 }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` adds to it.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sessionmix=debug".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub meter: MeterConfig,
    #[serde(default)]
    pub icons: IconConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
