//! OBD-II Client over a raw CAN channel
//!
//! Owns the CAN channel, the active response filter and the receive
//! buffer. One request is outstanding at a time.

use crate::addressing::AddressingMode;
use crate::bus::{CanBus, CanChannel, FilterId};
use crate::error::ObdError;
use crate::pid::{decode_response, request_frame, PidValue};
use crate::telemetry::Telemetry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default response timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// CAN controller name (e.g. "can0")
    pub channel: String,
    /// Candidate bitrates in discovery order
    pub bitrates: Vec<u32>,
    /// Transmit and receive timeout (milliseconds)
    pub response_timeout_ms: u64,
    /// Pause after closing a channel or dropping a filter (milliseconds)
    pub settle_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: "can0".to_string(),
            bitrates: vec![250_000, 500_000],
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            settle_delay_ms: 100,
        }
    }
}

impl ClientConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// OBD-II client bound to one CAN bus
pub struct ObdClient<B: CanBus> {
    pub(crate) bus: B,
    pub(crate) config: ClientConfig,
    /// Open channel, at most one
    pub(crate) channel: Option<B::Channel>,
    /// Installed response filter, at most one
    pub(crate) filter: Option<FilterId>,
    pub(crate) mode: AddressingMode,
    pub(crate) bitrate: Option<u32>,
    /// Receive buffer, reused for every response
    rx: [u8; 8],
    telemetry: Arc<Telemetry>,
}

impl<B: CanBus> ObdClient<B> {
    /// Create a client; no channel is opened until discovery
    pub fn new(bus: B, config: ClientConfig, telemetry: Arc<Telemetry>) -> Self {
        Self {
            bus,
            config,
            channel: None,
            filter: None,
            mode: AddressingMode::Standard,
            bitrate: None,
            rx: [0; 8],
            telemetry,
        }
    }

    /// Send one request on the functional id and decode the first reply.
    ///
    /// The shared telemetry is updated on success and the talking flag
    /// reflects the outcome either way.
    pub fn exchange(&mut self, service: u8, pid: u8) -> Result<PidValue, ObdError> {
        let result = self.transact(service, pid);
        match &result {
            Ok(value) => {
                debug!(pid = format!("{:02X}", pid), ?value, "OBD response");
                self.telemetry.apply(value);
            }
            Err(e) => debug!(pid = format!("{:02X}", pid), error = %e, "OBD exchange failed"),
        }
        self.telemetry.set_talking(result.is_ok());
        result
    }

    fn transact(&mut self, service: u8, pid: u8) -> Result<PidValue, ObdError> {
        let timeout = self.config.response_timeout();
        let functional = self.mode.profile().functional_request;
        let channel = self.channel.as_mut().ok_or(ObdError::NotConnected)?;

        channel.transmit(functional, &request_frame(service, pid), timeout)?;
        let frame = channel.receive(&mut self.rx, timeout)?;

        decode_response(service, &self.rx, frame.len)
    }

    /// Install the response filter for `mode`, replacing any previous one
    pub(crate) fn install_filter(&mut self, mode: AddressingMode) -> Result<(), ObdError> {
        self.remove_filter();
        let profile = mode.profile();
        let channel = self.channel.as_mut().ok_or(ObdError::NotConnected)?;
        let filter = channel.add_filter(profile.physical_response_base, profile.response_mask)?;
        self.filter = Some(filter);
        self.mode = mode;
        Ok(())
    }

    pub(crate) fn remove_filter(&mut self) {
        if let (Some(filter), Some(channel)) = (self.filter.take(), self.channel.as_mut()) {
            if let Err(e) = channel.del_filter(filter) {
                warn!("Failed to remove CAN filter {:?}: {}", filter, e);
            }
        }
    }

    pub(crate) fn settle(&self) {
        std::thread::sleep(self.config.settle_delay());
    }

    /// Close the channel if one is open
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            debug!(bitrate = ?self.bitrate, "Closing CAN channel");
            self.filter = None;
            self.bitrate = None;
            channel.close();
        }
    }

    /// Close the channel and hand the bus back
    pub fn into_bus(mut self) -> B {
        self.close();
        self.bus
    }

    /// Whether a channel is currently open
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Addressing mode of the last discovery attempt
    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Bitrate of the open channel
    pub fn bitrate(&self) -> Option<u32> {
        self.bitrate
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BusEvent, MockBus, MockEcu, MockFault};
    use crate::{mode, Pid};

    fn fast_config() -> ClientConfig {
        ClientConfig {
            response_timeout_ms: 1,
            settle_delay_ms: 0,
            ..Default::default()
        }
    }

    fn synced_client(ecu: MockEcu) -> (ObdClient<MockBus>, MockBus) {
        let bus = MockBus::new(ecu);
        let mut client = ObdClient::new(bus.clone(), fast_config(), Arc::new(Telemetry::new()));
        client.discover().unwrap();
        (client, bus)
    }

    #[test]
    fn test_exchange_without_channel() {
        let bus = MockBus::new(MockEcu::default());
        let mut client = ObdClient::new(bus, fast_config(), Arc::new(Telemetry::new()));
        assert_eq!(
            client.exchange(mode::CURRENT_DATA, Pid::Rpm.as_hex()),
            Err(ObdError::NotConnected)
        );
        assert!(!client.telemetry().is_talking());
    }

    #[test]
    fn test_exchange_updates_telemetry() {
        let ecu = MockEcu {
            rpm_raw: 0x1000,
            speed: 100,
            coolant_raw: 0x5A,
            ..Default::default()
        };
        let (mut client, _bus) = synced_client(ecu);

        assert_eq!(
            client.exchange(mode::CURRENT_DATA, Pid::Rpm.as_hex()),
            Ok(PidValue::EngineRpm(1024.0))
        );
        client.exchange(mode::CURRENT_DATA, Pid::Speed.as_hex()).unwrap();
        client.exchange(mode::CURRENT_DATA, Pid::CoolantTemp.as_hex()).unwrap();

        let telemetry = client.telemetry();
        assert!(telemetry.is_talking());
        assert_eq!(telemetry.rpm(), 1024.0);
        assert_eq!(telemetry.kmh(), 100);
        assert_eq!(telemetry.temp_c(), 50);
    }

    #[test]
    fn test_request_goes_to_functional_id() {
        let (mut client, bus) = synced_client(MockEcu::extended(500_000));
        bus.clear_events();
        client.exchange(mode::CURRENT_DATA, Pid::Speed.as_hex()).unwrap();

        assert_eq!(
            bus.events(),
            vec![BusEvent::Transmit {
                id: 0x8000_0000 | 0x18DB_33F1,
                data: [2, 0x01, 0x0D, 0, 0, 0, 0, 0],
            }]
        );
    }

    #[test]
    fn test_timeout_clears_talking() {
        let (mut client, bus) = synced_client(MockEcu::default());
        assert!(client.telemetry().is_talking());

        bus.inject(MockFault::Silence);
        assert_eq!(
            client.exchange(mode::CURRENT_DATA, Pid::Rpm.as_hex()),
            Err(ObdError::Timeout(1))
        );
        assert!(!client.telemetry().is_talking());
    }

    #[test]
    fn test_malformed_keeps_previous_value() {
        let ecu = MockEcu { speed: 42, ..Default::default() };
        let (mut client, bus) = synced_client(ecu);
        client.exchange(mode::CURRENT_DATA, Pid::Speed.as_hex()).unwrap();

        bus.inject(MockFault::Reply([0x03, 0x7F, 0x01, 0x12, 0, 0, 0, 0]));
        let result = client.exchange(mode::CURRENT_DATA, Pid::Speed.as_hex());
        assert!(matches!(result, Err(ObdError::Malformed(_))));
        assert!(!client.telemetry().is_talking());
        assert_eq!(client.telemetry().kmh(), 42);
    }

    #[test]
    fn test_unhandled_pid_counts_as_talking() {
        let (mut client, _bus) = synced_client(MockEcu::default());
        client.telemetry().set_talking(false);
        assert_eq!(
            client.exchange(mode::CURRENT_DATA, 0x11),
            Ok(PidValue::Unhandled(0x11))
        );
        assert!(client.telemetry().is_talking());
    }

    #[test]
    fn test_into_bus_closes_channel() {
        let (client, bus) = synced_client(MockEcu::default());
        assert_eq!(bus.open_channels(), 1);
        let _bus = client.into_bus();
        assert_eq!(bus.open_channels(), 0);
    }
}
