//! Bitrate and Addressing Discovery
//!
//! Probes every configured bitrate with standard then extended addressing
//! until an ECU answers the supported-PIDs request.

use crate::addressing::AddressingMode;
use crate::bus::CanBus;
use crate::client::ObdClient;
use crate::error::ObdError;
use crate::mode;
use crate::pid::Pid;
use tracing::{debug, info, warn};

/// Addressing modes in probe order
const MODES: [AddressingMode; 2] = [AddressingMode::Standard, AddressingMode::Extended];

impl<B: CanBus> ObdClient<B> {
    /// Find a working (addressing mode, bitrate) pair.
    ///
    /// On success the channel stays open with the matching response filter
    /// installed. On [`ObdError::NotFound`] no channel is left open.
    pub fn discover(&mut self) -> Result<(AddressingMode, u32), ObdError> {
        let bitrates = self.config.bitrates.clone();

        for bitrate in bitrates {
            if self.is_open() {
                self.close();
                self.settle();
            }

            match self.bus.open(&self.config.channel, bitrate) {
                Ok(channel) => {
                    self.channel = Some(channel);
                    self.bitrate = Some(bitrate);
                }
                Err(e) => {
                    warn!(bitrate, "Cannot open {}: {}", self.config.channel, e);
                    continue;
                }
            }

            for addressing in MODES {
                if self.probe(addressing) {
                    info!("Found OBD on {} CAN at {} bps", addressing.label(), bitrate);
                    self.settle();
                    return Ok((addressing, bitrate));
                }
            }
        }

        self.close();
        Err(ObdError::NotFound)
    }

    /// One discovery attempt on the open channel
    fn probe(&mut self, addressing: AddressingMode) -> bool {
        if let Err(e) = self.install_filter(addressing) {
            warn!(mode = addressing.label(), "Cannot install response filter: {}", e);
            return false;
        }

        match self.exchange(mode::CURRENT_DATA, Pid::Supported01To20.as_hex()) {
            Ok(supported) => {
                debug!(mode = addressing.label(), ?supported, "Probe answered");
                true
            }
            Err(e) => {
                debug!(mode = addressing.label(), bitrate = ?self.bitrate, "Probe failed: {}", e);
                self.remove_filter();
                self.settle();
                false
            }
        }
    }
}
