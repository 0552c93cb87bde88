//! Poll Loop Implementation

use crate::config::MonitorConfig;
use obd_protocol::{mode, CanBus, ObdClient, ObdError, Pid};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// PIDs requested each cycle, in order
pub const MONITORED_PIDS: [Pid; 3] = [Pid::Rpm, Pid::Speed, Pid::CoolantTemp];

/// Poll loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollState {
    /// No background activity
    Stopped = 0,
    /// Searching for bitrate and addressing mode
    Discovering = 1,
    /// Cycling through the monitored PIDs
    Synced = 2,
}

impl PollState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PollState::Discovering,
            2 => PollState::Synced,
            _ => PollState::Stopped,
        }
    }
}

/// Flags shared between the poll thread and its owner
#[derive(Debug)]
pub(crate) struct LoopShared {
    active: AtomicBool,
    state: AtomicU8,
}

impl LoopShared {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            state: AtomicU8::new(PollState::Stopped as u8),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> PollState {
        PollState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: PollState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Discovery/poll state machine driving one client
pub(crate) struct PollLoop<'a, B: CanBus> {
    client: &'a mut ObdClient<B>,
    config: &'a MonitorConfig,
    shared: &'a LoopShared,
}

impl<'a, B: CanBus> PollLoop<'a, B> {
    pub(crate) fn new(
        client: &'a mut ObdClient<B>,
        config: &'a MonitorConfig,
        shared: &'a LoopShared,
    ) -> Self {
        Self {
            client,
            config,
            shared,
        }
    }

    /// Run until the active flag drops.
    ///
    /// Only unrecoverable errors are returned; timeouts and malformed
    /// frames send the loop back to discovery.
    pub(crate) fn run(&mut self) -> Result<(), ObdError> {
        self.transition(PollState::Discovering);
        while self.shared.is_active() {
            self.step()?;
        }
        Ok(())
    }

    /// One discovery attempt or one poll cycle
    pub(crate) fn step(&mut self) -> Result<(), ObdError> {
        match self.shared.state() {
            PollState::Synced => self.poll_cycle(),
            PollState::Discovering | PollState::Stopped => self.discover(),
        }
    }

    fn discover(&mut self) -> Result<(), ObdError> {
        match self.client.discover() {
            Ok((mode, bitrate)) => {
                debug!(mode = mode.label(), bitrate, "Discovery complete");
                self.transition(PollState::Synced);
                Ok(())
            }
            Err(ObdError::NotFound) => {
                warn!("OBD service not found on CAN bus");
                self.pause(self.config.not_found_cooldown());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn poll_cycle(&mut self) -> Result<(), ObdError> {
        for pid in MONITORED_PIDS {
            self.pause(self.config.request_gap());
            if !self.shared.is_active() {
                return Ok(());
            }

            match self.client.exchange(mode::CURRENT_DATA, pid.as_hex()) {
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    info!("Lost OBD sync on PID {:02X}: {}", pid.as_hex(), e);
                    self.transition(PollState::Discovering);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        self.pause(self.config.cycle_delay());
        Ok(())
    }

    fn transition(&self, next: PollState) {
        let prev = self.shared.state();
        if prev != next {
            debug!("Poll state {:?} -> {:?}", prev, next);
            self.shared.set_state(next);
        }
    }

    /// Sleep in slices, returning early once the loop is stopped
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slice = self.config.stop_check();
        while self.shared.is_active() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(slice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::{BusEvent, MockBus, MockEcu, MockFault};
    use obd_protocol::{Telemetry, FUNCTIONAL_REQ_STD_ID};
    use std::sync::Arc;

    struct Fixture {
        bus: MockBus,
        client: ObdClient<MockBus>,
        config: MonitorConfig,
        shared: LoopShared,
    }

    impl Fixture {
        fn new(ecu: MockEcu) -> Self {
            let bus = MockBus::new(ecu);
            let config = MonitorConfig::fast();
            let client = ObdClient::new(bus.clone(), config.client.clone(), Arc::new(Telemetry::new()));
            let shared = LoopShared::new();
            shared.set_active(true);
            shared.set_state(PollState::Discovering);
            Self { bus, client, config, shared }
        }

        fn step(&mut self) -> Result<(), ObdError> {
            PollLoop::new(&mut self.client, &self.config, &self.shared).step()
        }

        /// PIDs of all transmitted requests
        fn requested_pids(&self) -> Vec<u8> {
            self.bus
                .events()
                .into_iter()
                .filter_map(|e| match e {
                    BusEvent::Transmit { data, .. } => Some(data[2]),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_discovery_then_full_cycle() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));

        fx.step().unwrap();
        assert_eq!(fx.shared.state(), PollState::Synced);

        fx.bus.clear_events();
        fx.step().unwrap();
        assert_eq!(fx.requested_pids(), vec![0x0C, 0x0D, 0x05]);
        assert!(fx
            .bus
            .events()
            .iter()
            .all(|e| matches!(e, BusEvent::Transmit { id: FUNCTIONAL_REQ_STD_ID, .. })));
        assert_eq!(fx.shared.state(), PollState::Synced);
    }

    #[test]
    fn test_timeout_abandons_cycle_and_rediscovers() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));
        fx.step().unwrap();
        fx.bus.clear_events();

        fx.bus.inject(MockFault::Silence);
        fx.step().unwrap();
        // RPM timed out; speed and coolant were never requested
        assert_eq!(fx.requested_pids(), vec![0x0C]);
        assert_eq!(fx.shared.state(), PollState::Discovering);
        assert!(!fx.client.telemetry().is_talking());

        fx.bus.clear_events();
        fx.step().unwrap();
        assert_eq!(fx.bus.events()[0], BusEvent::Close);
        assert_eq!(fx.requested_pids(), vec![0x00]);
        assert_eq!(fx.shared.state(), PollState::Synced);
        assert!(fx.client.telemetry().is_talking());
    }

    #[test]
    fn test_malformed_midcycle_rediscovers() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));
        fx.step().unwrap();
        fx.bus.clear_events();

        // RPM answers, then speed gets a frame with a bad echo
        fx.bus.inject(MockFault::Reply([0x04, 0x41, 0x0C, 0x10, 0x00, 0, 0, 0]));
        fx.bus.inject(MockFault::Reply([0x03, 0x49, 0x0D, 0x64, 0, 0, 0, 0]));
        fx.step().unwrap();
        assert_eq!(fx.requested_pids(), vec![0x0C, 0x0D]);
        assert_eq!(fx.shared.state(), PollState::Discovering);
        assert_eq!(fx.client.telemetry().rpm(), 1024.0);
    }

    #[test]
    fn test_not_found_stays_discovering() {
        let mut fx = Fixture::new(MockEcu { present: false, ..Default::default() });
        fx.step().unwrap();
        assert_eq!(fx.shared.state(), PollState::Discovering);
        assert_eq!(fx.bus.open_channels(), 0);

        fx.bus.update_ecu(|ecu| ecu.present = true);
        fx.step().unwrap();
        assert_eq!(fx.shared.state(), PollState::Synced);
    }

    #[test]
    fn test_transport_fault_is_returned() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));
        fx.step().unwrap();

        fx.bus.inject(MockFault::TransmitFails);
        assert!(matches!(fx.step(), Err(ObdError::Transport(_))));
    }

    #[test]
    fn test_inactive_cycle_sends_nothing() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));
        fx.step().unwrap();
        fx.bus.clear_events();

        fx.shared.set_active(false);
        fx.step().unwrap();
        assert!(fx.requested_pids().is_empty());
    }

    #[test]
    fn test_run_returns_when_inactive() {
        let mut fx = Fixture::new(MockEcu::standard(250_000));
        fx.shared.set_active(false);
        let result = PollLoop::new(&mut fx.client, &fx.config, &fx.shared).run();
        assert_eq!(result, Ok(()));
        assert!(fx.bus.events().is_empty());
    }
}
