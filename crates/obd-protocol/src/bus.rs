//! CAN Bus Collaborator Contract
//!
//! The driver layer underneath the OBD-II engine. Implementations are
//! expected to block up to the given timeout on transmit and receive.

use crate::error::ObdError;
use std::time::Duration;

/// Handle of an installed acceptance filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub u32);

/// Metadata of a frame written into the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Identifier including the EFF/RTR flags
    pub id: u32,
    /// Number of valid bytes in the buffer (DLC)
    pub len: usize,
}

/// Factory for CAN channels
pub trait CanBus: Send + 'static {
    /// Open channel type
    type Channel: CanChannel;

    /// Open `channel` at `bitrate` bit/s
    fn open(&mut self, channel: &str, bitrate: u32) -> Result<Self::Channel, ObdError>;
}

/// An open CAN channel, exclusively owned by its user
pub trait CanChannel: Send + 'static {
    /// Install an acceptance filter; a frame passes when
    /// `(frame_id & mask) == (id & mask)`
    fn add_filter(&mut self, id: u32, mask: u32) -> Result<FilterId, ObdError>;

    /// Remove a previously installed filter
    fn del_filter(&mut self, filter: FilterId) -> Result<(), ObdError>;

    /// Transmit one data frame
    fn transmit(&mut self, id: u32, data: &[u8], timeout: Duration) -> Result<(), ObdError>;

    /// Receive one frame passing the installed filter into `buf`.
    ///
    /// Returns [`ObdError::Timeout`] when nothing arrives in time.
    fn receive(&mut self, buf: &mut [u8; 8], timeout: Duration) -> Result<ReceivedFrame, ObdError>;

    /// Close the channel and release the controller
    fn close(self);
}

/// CAN transceiver standby control
pub trait Transceiver: Send + 'static {
    /// Drive the transceiver out of standby
    fn enable(&mut self);

    /// Put the transceiver into standby
    fn disable(&mut self);
}
