//! OBD-II Monitor - Main Entry Point
//!
//! Polls engine RPM, speed and coolant temperature and prints them while
//! the vehicle is talking. Runs against the simulated ECU on the mock bus.

mod settings;
mod simulator;

use anyhow::Context;
use obd_protocol::mock::{MockBus, MockTransceiver};
use obd_scheduler::ObdMonitor;
use settings::Settings;
use simulator::Drive;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let level = parse_level(level)?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn parse_level(level: &str) -> anyhow::Result<Level> {
    level
        .parse::<Level>()
        .with_context(|| format!("Invalid log_level {:?}", level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.log_level)?;

    info!("=== OBD-II Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        bitrate = settings.simulator.bitrate,
        addressing = settings.simulator.addressing.label(),
        "Simulated ECU attached"
    );

    let bus = MockBus::new(settings.simulator.ecu());
    // Cold engine
    bus.update_ecu(|ecu| ecu.coolant_raw = 60);
    let mut drive = Drive::default();

    let mut monitor = ObdMonitor::new(bus.clone(), MockTransceiver::new(), settings.monitor.clone());
    monitor.start()?;

    let mut ticker = tokio::time::interval(settings.display_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if !monitor.is_running() {
                    warn!("Unexpected exit");
                    return Ok(());
                }
                bus.update_ecu(|ecu| drive.advance(ecu));
                if monitor.is_talking() {
                    println!(
                        "RPM: {} KM/H: {} Temp.C: {}",
                        monitor.rpm(),
                        monitor.kmh(),
                        monitor.temp_c()
                    );
                }
            }
        }
    }

    // stop() blocks until the poll thread released the bus
    tokio::task::spawn_blocking(move || monitor.stop())
        .await
        .context("Stop task failed")??;
    Ok(())
}
