use thiserror::Error;

use crate::handshake::InitStep;

/// Errors that can occur when working with VScale body-composition scales
#[derive(Error, Debug)]
pub enum ScaleError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Device not found during scanning
    #[error("VScale device not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// Connection attempt timed out
    #[error("Connection timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// A handshake step was refused by the transport
    #[error("Handshake step {step} rejected by transport: {reason}")]
    TransportRejected {
        /// The step whose transport operation failed
        step: InitStep,
        /// Transport-level failure description
        reason: String,
    },

    /// Notification payload does not have the fixed measurement length
    #[error("Malformed payload: {len} bytes, expected {expected}", expected = crate::protocol::PAYLOAD_SIZE)]
    MalformedPayload {
        /// Length of the rejected buffer
        len: usize,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for scale operations
pub type Result<T> = std::result::Result<T, ScaleError>;

impl ScaleError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::DeviceNotFound
                | Self::Timeout { .. }
        )
    }

    /// Check if this error aborted the initialization handshake
    #[must_use]
    pub const fn is_handshake_error(&self) -> bool {
        matches!(self, Self::TransportRejected { .. })
    }

    /// Build a [`ScaleError::TransportRejected`] for `step` from any transport failure
    pub(crate) fn rejected(step: InitStep, cause: &Self) -> Self {
        Self::TransportRejected {
            step,
            reason: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let connection_error = ScaleError::ConnectionFailed("test".to_string());
        assert!(connection_error.is_connection_error());
        assert!(!connection_error.is_handshake_error());

        let timeout_error = ScaleError::Timeout { timeout_ms: 5000 };
        assert!(timeout_error.is_connection_error());

        let rejected = ScaleError::rejected(InitStep::SendUserProfile, &ScaleError::Disconnected);
        assert!(rejected.is_handshake_error());
        assert!(!rejected.is_connection_error());

        let malformed = ScaleError::MalformedPayload { len: 7 };
        assert!(!malformed.is_connection_error());
        assert!(!malformed.is_handshake_error());
    }

    #[test]
    fn test_error_display() {
        let error = ScaleError::MalformedPayload { len: 20 };
        let error_string = format!("{error}");
        assert!(error_string.contains("20 bytes"));
        assert!(error_string.contains("expected 19"));

        let rejected = ScaleError::rejected(
            InitStep::EnableAuxiliaryNotifications,
            &ScaleError::Protocol("write failed".to_string()),
        );
        let rejected_string = format!("{rejected}");
        assert!(rejected_string.contains("auxiliary"));
        assert!(rejected_string.contains("write failed"));
    }
}
