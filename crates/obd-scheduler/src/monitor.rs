//! OBD-II Monitor
//!
//! Owns the bus and transceiver while idle and lends them to the poll
//! thread while running. `stop` joins the thread, so when it returns the
//! CAN channel is closed and the bus is back in the monitor.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::scheduler::{LoopShared, PollLoop, PollState};
use obd_protocol::{CanBus, ObdClient, Telemetry, TelemetrySnapshot, Transceiver};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Background OBD-II poller with start/stop control
pub struct ObdMonitor<B: CanBus, X: Transceiver> {
    config: MonitorConfig,
    shared: Arc<LoopShared>,
    telemetry: Arc<Telemetry>,
    /// Bus and transceiver while no poll thread holds them
    parts: Option<(B, X)>,
    worker: Option<JoinHandle<(B, X)>>,
}

impl<B: CanBus, X: Transceiver> ObdMonitor<B, X> {
    /// Create a stopped monitor
    pub fn new(bus: B, transceiver: X, config: MonitorConfig) -> Self {
        info!("Creating OBD monitor on {}", config.client.channel);
        Self {
            config,
            shared: Arc::new(LoopShared::new()),
            telemetry: Arc::new(Telemetry::new()),
            parts: Some((bus, transceiver)),
            worker: None,
        }
    }

    /// Spawn the poll thread
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.shared.is_active() {
            return Err(MonitorError::AlreadyRunning);
        }

        // A thread that exited on a fault still holds the bus
        self.reap();
        let (bus, transceiver) = self.parts.take().ok_or(MonitorError::BusUnavailable)?;

        info!("Starting OBD poll loop");
        self.shared.set_active(true);
        let client = ObdClient::new(bus, self.config.client.clone(), Arc::clone(&self.telemetry));
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);

        self.worker = Some(std::thread::spawn(move || {
            run_worker(client, transceiver, &config, &shared)
        }));
        Ok(())
    }

    /// Ask the poll thread to finish and wait until it released the bus
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        if !self.shared.is_active() {
            return Err(MonitorError::NotRunning);
        }

        info!("Stopping OBD poll loop");
        self.shared.set_active(false);
        self.reap();
        Ok(())
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(parts) => self.parts = Some(parts),
                Err(_) => error!("OBD poll thread died, CAN bus lost"),
            }
        }
    }

    /// Whether the poll loop is active
    pub fn is_running(&self) -> bool {
        self.shared.is_active()
    }

    /// Whether the last exchange with the vehicle succeeded
    pub fn is_talking(&self) -> bool {
        self.telemetry.is_talking()
    }

    /// Current poll loop state
    pub fn state(&self) -> PollState {
        self.shared.state()
    }

    pub fn rpm(&self) -> f32 {
        self.telemetry.rpm()
    }

    pub fn kmh(&self) -> u8 {
        self.telemetry.kmh()
    }

    pub fn temp_c(&self) -> i16 {
        self.telemetry.temp_c()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Shared telemetry handle for readers on other threads
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }
}

impl<B: CanBus, X: Transceiver> Drop for ObdMonitor<B, X> {
    fn drop(&mut self) {
        self.shared.set_active(false);
        self.reap();
    }
}

/// Poll thread body: power up, loop, then release everything
fn run_worker<B: CanBus, X: Transceiver>(
    mut client: ObdClient<B>,
    mut transceiver: X,
    config: &MonitorConfig,
    shared: &LoopShared,
) -> (B, X) {
    transceiver.enable();
    std::thread::sleep(config.transceiver_settle());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        PollLoop::new(&mut client, config, shared).run()
    }));
    match outcome {
        Ok(Ok(())) => info!("OBD poll loop stopped"),
        Ok(Err(e)) => warn!("OBD poll loop fault: {}", e),
        Err(_) => error!("OBD poll loop panicked"),
    }

    let telemetry = Arc::clone(client.telemetry());
    let bus = client.into_bus();
    transceiver.disable();
    std::thread::sleep(config.transceiver_settle());

    telemetry.set_talking(false);
    shared.set_state(PollState::Stopped);
    shared.set_active(false);
    (bus, transceiver)
}
