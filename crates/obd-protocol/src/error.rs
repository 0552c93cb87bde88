//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObdError {
    /// CAN channel open/close/filter/transmit failure
    #[error("CAN transport error: {0}")]
    Transport(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Response failed length or service echo validation
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Discovery exhausted all bitrate/addressing candidates
    #[error("OBD service not found on CAN bus")]
    NotFound,

    /// No CAN channel is open
    #[error("CAN channel not open")]
    NotConnected,
}

impl ObdError {
    /// Whether this error only means the link lost sync
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ObdError::Timeout(_)
                | ObdError::Malformed(_)
                | ObdError::NotFound
                | ObdError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(ObdError::Timeout(100).is_recoverable());
        assert!(ObdError::Malformed("short".into()).is_recoverable());
        assert!(ObdError::NotFound.is_recoverable());
        assert!(ObdError::NotConnected.is_recoverable());
        assert!(!ObdError::Transport("bus off".into()).is_recoverable());
    }
}
