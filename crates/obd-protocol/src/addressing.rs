//! OBD-II Addressing Profiles (ISO 15765-4)
//!
//! Identifier and mask tuples for 11-bit (standard) and 29-bit (extended)
//! CAN addressing.

use serde::{Deserialize, Serialize};

/// Extended frame format flag carried in bit 31 of an identifier
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag carried in bit 30 of an identifier
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Valid bits of a standard identifier
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
/// Valid bits of an extended identifier
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Functional (broadcast) request, 11-bit
pub const FUNCTIONAL_REQ_STD_ID: u32 = 0x7DF;
/// Physical request to ECU #0, up to 0x7E7
pub const PHYSICAL_REQ_STD_ID: u32 = 0x7E0;
/// Physical response from ECU #0, up to 0x7EF (request id + 8)
pub const PHYSICAL_RES_STD_ID: u32 = 0x7E8;
/// Accepts any of the eight standard response ids
pub const PHYSICAL_STD_MASK: u32 = CAN_SFF_MASK ^ 0x007;

/// Functional (broadcast) request, 29-bit
pub const FUNCTIONAL_REQ_EXT_ID: u32 = CAN_EFF_FLAG | 0x18DB_33F1;
/// Physical request to ECU 0x00, up to 0x18DAFFF1
pub const PHYSICAL_REQ_EXT_ID: u32 = CAN_EFF_FLAG | 0x18DA_00F1;
/// Physical response from ECU 0x00, up to 0x18DAF1FF
pub const PHYSICAL_RES_EXT_ID: u32 = CAN_EFF_FLAG | 0x18DA_F100;
/// Accepts any of the 256 extended response ids
pub const PHYSICAL_EXT_MASK: u32 = CAN_EFF_MASK ^ 0x00FF;

/// CAN identifier width used to reach the OBD-II service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressingMode {
    /// 11-bit identifiers
    #[default]
    Standard,
    /// 29-bit identifiers
    Extended,
}

/// Identifier set for one addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingProfile {
    /// Broadcast request id, read by every ECU
    pub functional_request: u32,
    /// First physical request id
    pub physical_request_base: u32,
    /// Last physical request id
    pub physical_request_last: u32,
    /// First physical response id
    pub physical_response_base: u32,
    /// Last physical response id
    pub physical_response_last: u32,
    /// Filter mask for `physical_response_base`, including the frame-format
    /// and RTR flags so only data frames of the right width pass
    pub response_mask: u32,
}

const STANDARD: AddressingProfile = AddressingProfile {
    functional_request: FUNCTIONAL_REQ_STD_ID,
    physical_request_base: PHYSICAL_REQ_STD_ID,
    physical_request_last: 0x7E7,
    physical_response_base: PHYSICAL_RES_STD_ID,
    physical_response_last: 0x7EF,
    response_mask: PHYSICAL_STD_MASK | CAN_EFF_FLAG | CAN_RTR_FLAG,
};

const EXTENDED: AddressingProfile = AddressingProfile {
    functional_request: FUNCTIONAL_REQ_EXT_ID,
    physical_request_base: PHYSICAL_REQ_EXT_ID,
    physical_request_last: CAN_EFF_FLAG | 0x18DA_FFF1,
    physical_response_base: PHYSICAL_RES_EXT_ID,
    physical_response_last: CAN_EFF_FLAG | 0x18DA_F1FF,
    response_mask: PHYSICAL_EXT_MASK | CAN_EFF_FLAG | CAN_RTR_FLAG,
};

impl AddressingMode {
    /// Identifier set for this mode
    pub fn profile(&self) -> &'static AddressingProfile {
        match self {
            AddressingMode::Standard => &STANDARD,
            AddressingMode::Extended => &EXTENDED,
        }
    }

    /// Whether identifiers carry the extended frame flag
    pub fn is_extended(&self) -> bool {
        matches!(self, AddressingMode::Extended)
    }

    /// Human readable name used in logs
    pub fn label(&self) -> &'static str {
        match self {
            AddressingMode::Standard => "standard",
            AddressingMode::Extended => "extended",
        }
    }
}

impl AddressingProfile {
    /// Evaluate the response filter against a received identifier
    pub fn accepts(&self, id: u32) -> bool {
        (id & self.response_mask) == (self.physical_response_base & self.response_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_constants() {
        let p = AddressingMode::Standard.profile();
        assert_eq!(p.functional_request, 0x7DF);
        assert_eq!(p.physical_request_base, 0x7E0);
        assert_eq!(p.physical_response_base, 0x7E8);
        assert_eq!(PHYSICAL_STD_MASK, 0x7F8);
    }

    #[test]
    fn test_extended_constants_carry_flag() {
        let p = AddressingMode::Extended.profile();
        assert_eq!(p.functional_request, 0x8000_0000 | 0x18DB33F1);
        assert_ne!(p.physical_response_base & CAN_EFF_FLAG, 0);
        assert_eq!(PHYSICAL_EXT_MASK, 0x1FFF_FF00);
        assert!(AddressingMode::Extended.is_extended());
        assert!(!AddressingMode::Standard.is_extended());
    }

    #[test]
    fn test_standard_filter_accepts_response_range() {
        let p = AddressingMode::Standard.profile();
        for id in 0x7E8..=0x7EF {
            assert!(p.accepts(id), "{:03X} should pass", id);
        }
        assert!(!p.accepts(0x7E0));
        assert!(!p.accepts(0x7DF));
        assert!(!p.accepts(0x7E8 | CAN_RTR_FLAG));
        assert!(!p.accepts(0x7E8 | CAN_EFF_FLAG));
    }

    #[test]
    fn test_extended_filter_accepts_response_range() {
        let p = AddressingMode::Extended.profile();
        assert!(p.accepts(CAN_EFF_FLAG | 0x18DA_F100));
        assert!(p.accepts(CAN_EFF_FLAG | 0x18DA_F110));
        assert!(p.accepts(CAN_EFF_FLAG | 0x18DA_F1FF));
        // Missing EFF flag: an 11-bit frame never matches
        assert!(!p.accepts(0x18DA_F110));
        assert!(!p.accepts(CAN_EFF_FLAG | 0x18DA_F200));
        assert!(!p.accepts(CAN_EFF_FLAG | 0x18DB_33F1));
    }
}
