//! OBD-II Poll Loop
//!
//! Keeps a background thread synchronized with the vehicle: discovery when
//! the link is down, a fixed RPM/speed/coolant cycle when it is up.

mod config;
mod error;
mod monitor;
mod scheduler;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::ObdMonitor;
pub use scheduler::{PollState, MONITORED_PIDS};
