//! OBD-II Protocol Implementation
//!
//! This crate talks ISO 15765-4 directly on a raw CAN channel: it finds the
//! bitrate and identifier width the vehicle uses, sends single-frame Mode 01
//! requests on the functional address and decodes the replies into a shared
//! telemetry store.

mod addressing;
mod bus;
mod client;
mod discovery;
mod error;
pub mod mock;
mod pid;
mod telemetry;

pub use addressing::{
    AddressingMode, AddressingProfile, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_RTR_FLAG, CAN_SFF_MASK,
    FUNCTIONAL_REQ_EXT_ID, FUNCTIONAL_REQ_STD_ID, PHYSICAL_EXT_MASK, PHYSICAL_REQ_EXT_ID,
    PHYSICAL_REQ_STD_ID, PHYSICAL_RES_EXT_ID, PHYSICAL_RES_STD_ID, PHYSICAL_STD_MASK,
};
pub use bus::{CanBus, CanChannel, FilterId, ReceivedFrame, Transceiver};
pub use client::{ClientConfig, ObdClient};
pub use error::ObdError;
pub use pid::{decode_response, request_frame, Pid, PidValue};
pub use telemetry::{Telemetry, TelemetrySnapshot};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Added to the service id in a positive response
    pub const POSITIVE_RESPONSE: u8 = 0x40;
}
