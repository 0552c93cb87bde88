//! Monitor Error Types

use thiserror::Error;

/// Errors reported to the caller of `start`/`stop`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// `start` called while the poll loop is active
    #[error("OBD monitor is already running")]
    AlreadyRunning,

    /// `stop` called while the poll loop is not active
    #[error("OBD monitor is not running")]
    NotRunning,

    /// The bus was lost when the poll thread died
    #[error("CAN bus unavailable after poll thread failure")]
    BusUnavailable,
}
