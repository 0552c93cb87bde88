//! Monitor configuration

use obd_protocol::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// CAN channel, bitrates and protocol timeouts
    pub client: ClientConfig,

    /// Pause before each request in a cycle (milliseconds)
    pub request_gap_ms: u64,

    /// Pause after the last request of a cycle (milliseconds)
    pub cycle_delay_ms: u64,

    /// Pause after discovery found nothing (milliseconds)
    pub not_found_cooldown_ms: u64,

    /// Pause after toggling the transceiver (milliseconds)
    pub transceiver_settle_ms: u64,

    /// Longest uninterrupted sleep; bounds how late a stop is noticed
    pub stop_check_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            request_gap_ms: 10,
            cycle_delay_ms: 100,
            not_found_cooldown_ms: 1000,
            transceiver_settle_ms: 10,
            stop_check_ms: 50,
        }
    }
}

impl MonitorConfig {
    /// Millisecond timings for tests and simulation
    pub fn fast() -> Self {
        Self {
            client: ClientConfig {
                response_timeout_ms: 1,
                settle_delay_ms: 0,
                ..Default::default()
            },
            request_gap_ms: 1,
            cycle_delay_ms: 1,
            not_found_cooldown_ms: 5,
            transceiver_settle_ms: 0,
            stop_check_ms: 1,
        }
    }

    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.request_gap_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn not_found_cooldown(&self) -> Duration {
        Duration::from_millis(self.not_found_cooldown_ms)
    }

    pub fn transceiver_settle(&self) -> Duration {
        Duration::from_millis(self.transceiver_settle_ms)
    }

    pub fn stop_check(&self) -> Duration {
        Duration::from_millis(self.stop_check_ms.max(1))
    }
}
