//! Layered application settings
//!
//! Defaults, then an optional config file, then `OBD_` environment
//! variables (`OBD_MONITOR__CLIENT__CHANNEL=can1`).

use obd_protocol::mock::MockEcu;
use obd_protocol::AddressingMode;
use obd_scheduler::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// tracing max level ("error" .. "trace")
    pub log_level: String,
    /// Period of the console readout (milliseconds)
    pub display_interval_ms: u64,
    /// Poll loop configuration
    pub monitor: MonitorConfig,
    /// Simulated vehicle on the mock bus
    pub simulator: SimulatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            display_interval_ms: 200,
            monitor: MonitorConfig::default(),
            simulator: SimulatorSettings::default(),
        }
    }
}

/// Where the simulated ECU sits on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub bitrate: u32,
    pub addressing: AddressingMode,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            bitrate: 500_000,
            addressing: AddressingMode::Extended,
        }
    }
}

impl SimulatorSettings {
    pub fn ecu(&self) -> MockEcu {
        match self.addressing {
            AddressingMode::Standard => MockEcu::standard(self.bitrate),
            AddressingMode::Extended => MockEcu::extended(self.bitrate),
        }
    }
}

/// `OBD_` prefix, `__` between nested keys
fn environment() -> config::Environment {
    config::Environment::with_prefix("OBD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load settings, reading `path` if given
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, environment())
    }

    fn load_with(
        path: Option<&str>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder.add_source(env).build()?.try_deserialize()
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms.max(1))
    }
}
