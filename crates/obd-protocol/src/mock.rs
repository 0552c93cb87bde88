//! In-memory CAN bus with a simulated OBD-II ECU
//!
//! Used by tests and by the demo binary when no hardware is attached. The
//! ECU only answers functional Mode 01 requests sent at its bitrate with its
//! addressing mode, and its replies only reach the receiver if the
//! installed filter accepts them, so discovery behaves as on a real bus.

use crate::addressing::AddressingMode;
use crate::bus::{CanBus, CanChannel, FilterId, ReceivedFrame, Transceiver};
use crate::error::ObdError;
use crate::mode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Padding byte used by the simulated ECU
const PAD: u8 = 0x55;

/// Simulated ECU behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEcu {
    /// Whether an ECU is attached at all
    pub present: bool,
    /// Bitrate the ECU listens on
    pub bitrate: u32,
    /// Identifier width the ECU uses
    pub mode: AddressingMode,
    /// Offset of the ECU's response id from the physical response base
    pub response_offset: u8,
    /// Supported PIDs 01-20 bitmap
    pub supported: u32,
    /// Raw RPM value (rpm * 4)
    pub rpm_raw: u16,
    /// Speed (km/h)
    pub speed: u8,
    /// Raw coolant value (°C + 40)
    pub coolant_raw: u8,
}

impl Default for MockEcu {
    fn default() -> Self {
        Self {
            present: true,
            bitrate: 250_000,
            mode: AddressingMode::Standard,
            response_offset: 0,
            // 0x05, 0x0C, 0x0D
            supported: 0x0818_0000,
            rpm_raw: 800 * 4,
            speed: 0,
            coolant_raw: 90 + 40,
        }
    }
}

impl MockEcu {
    /// ECU on 11-bit identifiers
    pub fn standard(bitrate: u32) -> Self {
        Self {
            bitrate,
            ..Default::default()
        }
    }

    /// ECU on 29-bit identifiers
    pub fn extended(bitrate: u32) -> Self {
        Self {
            bitrate,
            mode: AddressingMode::Extended,
            response_offset: 0x10,
            ..Default::default()
        }
    }

    fn response_id(&self) -> u32 {
        self.mode.profile().physical_response_base + self.response_offset as u32
    }

    fn reply(&self, pid: u8) -> [u8; 8] {
        let echo = mode::POSITIVE_RESPONSE | mode::CURRENT_DATA;
        match pid {
            0x00 => {
                let b = self.supported.to_be_bytes();
                [6, echo, pid, b[0], b[1], b[2], b[3], PAD]
            }
            0x05 => [3, echo, pid, self.coolant_raw, PAD, PAD, PAD, PAD],
            0x0C => {
                let b = self.rpm_raw.to_be_bytes();
                [4, echo, pid, b[0], b[1], PAD, PAD, PAD]
            }
            0x0D => [3, echo, pid, self.speed, PAD, PAD, PAD, PAD],
            _ => [3, echo, pid, 0, PAD, PAD, PAD, PAD],
        }
    }
}

/// Fault injected into the next matching bus operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    /// Next `open` fails
    OpenFails,
    /// Next `transmit` fails with a transport error
    TransmitFails,
    /// Next `receive` times out
    Silence,
    /// Next `receive` yields these bytes from the ECU's response id
    Reply([u8; 8]),
}

/// Bus operation recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Open { bitrate: u32 },
    Close,
    AddFilter { id: u32, mask: u32 },
    DelFilter { id: u32 },
    Transmit { id: u32, data: [u8; 8] },
}

#[derive(Debug)]
struct MockState {
    ecu: MockEcu,
    faults: VecDeque<MockFault>,
    events: Vec<BusEvent>,
    open_channels: usize,
    next_filter: u32,
}

impl MockState {
    fn take_fault(&mut self, pred: impl Fn(&MockFault) -> bool) -> Option<MockFault> {
        if self.faults.front().map(&pred).unwrap_or(false) {
            self.faults.pop_front()
        } else {
            None
        }
    }
}

/// Cloneable handle to a shared simulated bus
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// Create a bus with one simulated ECU
    pub fn new(ecu: MockEcu) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                ecu,
                faults: VecDeque::new(),
                events: Vec::new(),
                open_channels: 0,
                next_filter: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Queue a fault; faults are consumed in order
    pub fn inject(&self, fault: MockFault) {
        self.lock().faults.push_back(fault);
    }

    /// Modify the simulated ECU
    pub fn update_ecu(&self, f: impl FnOnce(&mut MockEcu)) {
        f(&mut self.lock().ecu);
    }

    /// Recorded operations since creation or the last clear
    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Number of channels opened and not yet closed
    pub fn open_channels(&self) -> usize {
        self.lock().open_channels
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CanBus for MockBus {
    type Channel = MockChannel;

    fn open(&mut self, channel: &str, bitrate: u32) -> Result<MockChannel, ObdError> {
        let mut state = self.lock();
        if state.take_fault(|f| matches!(f, MockFault::OpenFails)).is_some() {
            return Err(ObdError::Transport(format!("cannot open {}", channel)));
        }
        state.events.push(BusEvent::Open { bitrate });
        state.open_channels += 1;
        debug!(channel, bitrate, "Mock channel opened");

        Ok(MockChannel {
            state: Arc::clone(&self.state),
            bitrate,
            filters: Vec::new(),
            pending: None,
        })
    }
}

/// Channel on a [`MockBus`]
#[derive(Debug)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    bitrate: u32,
    filters: Vec<(FilterId, u32, u32)>,
    /// ECU reply to the last request: (id, data)
    pending: Option<(u32, [u8; 8])>,
}

impl MockChannel {
    fn accepts(&self, frame_id: u32) -> bool {
        self.filters
            .iter()
            .any(|(_, id, mask)| frame_id & mask == id & mask)
    }
}

impl CanChannel for MockChannel {
    fn add_filter(&mut self, id: u32, mask: u32) -> Result<FilterId, ObdError> {
        let mut state = lock(&self.state);
        let filter = FilterId(state.next_filter);
        state.next_filter += 1;
        state.events.push(BusEvent::AddFilter { id, mask });
        self.filters.push((filter, id, mask));
        Ok(filter)
    }

    fn del_filter(&mut self, filter: FilterId) -> Result<(), ObdError> {
        let pos = self
            .filters
            .iter()
            .position(|(f, _, _)| *f == filter)
            .ok_or_else(|| ObdError::Transport(format!("unknown filter {:?}", filter)))?;
        let (_, id, _) = self.filters.remove(pos);
        lock(&self.state).events.push(BusEvent::DelFilter { id });
        Ok(())
    }

    fn transmit(&mut self, id: u32, data: &[u8], _timeout: Duration) -> Result<(), ObdError> {
        let mut frame = [0u8; 8];
        let n = data.len().min(8);
        frame[..n].copy_from_slice(&data[..n]);

        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, MockFault::TransmitFails)).is_some() {
            return Err(ObdError::Transport("bus off".to_string()));
        }
        state.events.push(BusEvent::Transmit { id, data: frame });

        let ecu = &state.ecu;
        let answers = ecu.present
            && ecu.bitrate == self.bitrate
            && id == ecu.mode.profile().functional_request
            && frame[0] == 2
            && frame[1] == mode::CURRENT_DATA;
        self.pending = answers.then(|| (ecu.response_id(), ecu.reply(frame[2])));
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8; 8], timeout: Duration) -> Result<ReceivedFrame, ObdError> {
        let pending = self.pending.take();
        let fault = lock(&self.state)
            .take_fault(|f| matches!(f, MockFault::Silence | MockFault::Reply(_)));
        let timed_out = ObdError::Timeout(timeout.as_millis() as u64);

        let (id, data) = match fault {
            Some(MockFault::Silence) => return Err(timed_out),
            Some(MockFault::Reply(data)) => (lock(&self.state).ecu.response_id(), data),
            _ => match pending {
                Some((id, data)) if self.accepts(id) => (id, data),
                _ => return Err(timed_out),
            },
        };

        *buf = data;
        Ok(ReceivedFrame { id, len: 8 })
    }

    fn close(self) {
        let mut state = lock(&self.state);
        state.events.push(BusEvent::Close);
        state.open_channels = state.open_channels.saturating_sub(1);
    }
}

/// Transceiver standby pin stand-in
#[derive(Debug, Clone, Default)]
pub struct MockTransceiver {
    enabled: Arc<AtomicBool>,
    toggles: Arc<AtomicUsize>,
}

impl MockTransceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Number of enable/disable calls so far
    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }
}

impl Transceiver for MockTransceiver {
    fn enable(&mut self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&mut self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{CAN_EFF_FLAG, FUNCTIONAL_REQ_STD_ID};

    const T: Duration = Duration::from_millis(5);

    #[test]
    fn test_ecu_ignores_wrong_bitrate() {
        let mut bus = MockBus::new(MockEcu::standard(500_000));
        let mut ch = bus.open("can0", 250_000).unwrap();
        ch.add_filter(0x7E8, 0x7F8).unwrap();
        ch.transmit(FUNCTIONAL_REQ_STD_ID, &[2, 1, 0x0C, 0, 0, 0, 0, 0], T).unwrap();
        let mut buf = [0; 8];
        assert_eq!(ch.receive(&mut buf, T), Err(ObdError::Timeout(5)));
    }

    #[test]
    fn test_reply_needs_matching_filter() {
        let mut bus = MockBus::new(MockEcu::extended(250_000));
        let mut ch = bus.open("can0", 250_000).unwrap();
        let id = CAN_EFF_FLAG | 0x18DB_33F1;
        let mut buf = [0; 8];

        ch.transmit(id, &[2, 1, 0x0D, 0, 0, 0, 0, 0], T).unwrap();
        assert!(ch.receive(&mut buf, T).is_err());

        ch.add_filter(CAN_EFF_FLAG | 0x18DA_F100, 0x1FFF_FF00).unwrap();
        ch.transmit(id, &[2, 1, 0x0D, 0, 0, 0, 0, 0], T).unwrap();
        let frame = ch.receive(&mut buf, T).unwrap();
        assert_eq!(frame.id, CAN_EFF_FLAG | 0x18DA_F110);
        assert_eq!(&buf[..4], &[3, 0x41, 0x0D, 0]);
    }

    #[test]
    fn test_open_channel_accounting() {
        let mut bus = MockBus::new(MockEcu::default());
        let ch = bus.open("can0", 250_000).unwrap();
        assert_eq!(bus.open_channels(), 1);
        ch.close();
        assert_eq!(bus.open_channels(), 0);
        assert_eq!(
            bus.events(),
            vec![BusEvent::Open { bitrate: 250_000 }, BusEvent::Close]
        );
    }

    #[test]
    fn test_transceiver_toggles() {
        let mut xcvr = MockTransceiver::new();
        xcvr.enable();
        assert!(xcvr.is_enabled());
        xcvr.disable();
        assert!(!xcvr.is_enabled());
        assert_eq!(xcvr.toggles(), 2);
    }
}
