//! OBD-II PID Definitions and Response Parsing
//!
//! Single-frame request building and decoding of the Mode 01 PIDs this
//! crate monitors.

use crate::error::ObdError;
use crate::mode;
use serde::{Deserialize, Serialize};

/// OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Supported PIDs 01-20 bitmap (0x00)
    Supported01To20 = 0x00,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
}

impl Pid {
    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Look up a known PID
    pub fn from_hex(pid: u8) -> Option<Self> {
        match pid {
            0x00 => Some(Pid::Supported01To20),
            0x05 => Some(Pid::CoolantTemp),
            0x0C => Some(Pid::Rpm),
            0x0D => Some(Pid::Speed),
            _ => None,
        }
    }

    /// Get the number of response data bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Supported01To20 => 4,
            Pid::Rpm => 2,
            Pid::CoolantTemp | Pid::Speed => 1,
        }
    }
}

/// Decoded payload of a positive response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PidValue {
    /// Bitmap of PIDs 0x01-0x20, MSB = PID 0x01
    SupportedPids(u32),
    /// Coolant temperature in °C
    CoolantTemp(i16),
    /// Engine speed in rpm, 0.25 rpm resolution
    EngineRpm(f32),
    /// Vehicle speed in km/h
    VehicleSpeed(u8),
    /// Valid service echo for a PID this crate does not decode
    Unhandled(u8),
}

impl PidValue {
    /// Whether a supported-PIDs bitmap lists `pid`
    pub fn supports(&self, pid: u8) -> bool {
        match self {
            PidValue::SupportedPids(bits) if (0x01..=0x20).contains(&pid) => {
                *bits & (1u32 << (0x20 - pid)) != 0
            }
            _ => false,
        }
    }
}

/// Build a single-frame request: `[2, service, pid, 0, 0, 0, 0, 0]`
pub fn request_frame(service: u8, pid: u8) -> [u8; 8] {
    [2, service, pid, 0, 0, 0, 0, 0]
}

/// Validate and decode a single-frame response.
///
/// `len` is the received DLC. Byte 0 is the ISO-TP length, byte 1 the
/// service echo, byte 2 the PID and bytes 3.. the PID data.
pub fn decode_response(service: u8, data: &[u8; 8], len: usize) -> Result<PidValue, ObdError> {
    if len < 3 || data[0] < 3 {
        return Err(ObdError::Malformed(format!(
            "too short: dlc {} length byte {}",
            len, data[0]
        )));
    }

    let echo = mode::POSITIVE_RESPONSE | service;
    if data[1] != echo {
        return Err(ObdError::Malformed(format!(
            "service echo {:02X}, expected {:02X}",
            data[1], echo
        )));
    }

    let known = Pid::from_hex(data[2]);
    if let Some(pid) = known {
        let need = pid.response_bytes();
        if (data[0] as usize) < 2 + need || len < 3 + need {
            return Err(ObdError::Malformed(format!(
                "PID {:02X} truncated: dlc {} length byte {}, needs {} data bytes",
                data[2], len, data[0], need
            )));
        }
    }

    let value = match known {
        // Temp: A - 40 (°C)
        Some(Pid::CoolantTemp) => PidValue::CoolantTemp(data[3] as i16 - 40),
        // RPM: ((A*256)+B)/4
        Some(Pid::Rpm) => {
            PidValue::EngineRpm((((data[3] as u16) << 8) | data[4] as u16) as f32 / 4.0)
        }
        // Speed: A (km/h)
        Some(Pid::Speed) => PidValue::VehicleSpeed(data[3]),
        Some(Pid::Supported01To20) => {
            PidValue::SupportedPids(u32::from_be_bytes([data[3], data[4], data[5], data[6]]))
        }
        None => PidValue::Unhandled(data[2]),
    };

    Ok(value)
}
