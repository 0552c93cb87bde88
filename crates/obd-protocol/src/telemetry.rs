//! Shared Telemetry Store
//!
//! Written by the polling thread right after each decode, read by anyone.
//! Every field is its own atomic: a reader may see a mix of old and new
//! fields, never a half-written one.

use crate::pid::PidValue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicU8, Ordering};

/// Latest decoded values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Engine RPM
    pub rpm: f32,
    /// Vehicle speed (km/h)
    pub kmh: u8,
    /// Coolant temperature (°C)
    pub temp_c: i16,
}

/// Lock-free single-writer telemetry cell
#[derive(Debug, Default)]
pub struct Telemetry {
    rpm_bits: AtomicU32,
    kmh: AtomicU8,
    temp_c: AtomicI16,
    talking: AtomicBool,
}

impl Telemetry {
    /// Create a zeroed store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a decoded value; non-telemetry values are ignored
    pub fn apply(&self, value: &PidValue) {
        match *value {
            PidValue::EngineRpm(rpm) => self.rpm_bits.store(rpm.to_bits(), Ordering::Relaxed),
            PidValue::VehicleSpeed(kmh) => self.kmh.store(kmh, Ordering::Relaxed),
            PidValue::CoolantTemp(temp) => self.temp_c.store(temp, Ordering::Relaxed),
            PidValue::SupportedPids(_) | PidValue::Unhandled(_) => {}
        }
    }

    /// Record the outcome of the last exchange
    pub fn set_talking(&self, talking: bool) {
        self.talking.store(talking, Ordering::Release);
    }

    /// Whether the last exchange decoded successfully
    pub fn is_talking(&self) -> bool {
        self.talking.load(Ordering::Acquire)
    }

    pub fn rpm(&self) -> f32 {
        f32::from_bits(self.rpm_bits.load(Ordering::Relaxed))
    }

    pub fn kmh(&self) -> u8 {
        self.kmh.load(Ordering::Relaxed)
    }

    pub fn temp_c(&self) -> i16 {
        self.temp_c.load(Ordering::Relaxed)
    }

    /// Copy all three fields (not atomic as a whole)
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            rpm: self.rpm(),
            kmh: self.kmh(),
            temp_c: self.temp_c(),
        }
    }
}
