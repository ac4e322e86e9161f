//! Bridge error types.

use bifrost_proto::{Opcode, ProtocolError};
use thiserror::Error;

use crate::directory::DeviceToken;

/// Errors from bridge operations.
///
/// These cover the caller-initiated paths only. Faults on inbound paths
/// (unrecognized replies, failed attach probes, dirty closes) are never
/// errors: they are logged and surfaced as status actions, because there is
/// no caller to hand them to.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A new request was issued while one is already in flight.
    ///
    /// Surfaced to the caller, never silently queued; the single-pending
    /// invariant must stay auditable.
    #[error("protocol busy: {pending:?} already in flight")]
    ProtocolBusy {
        /// Opcode of the request currently awaiting its reply.
        pending: Opcode,
    },

    /// A memory operation was requested with no device attached.
    #[error("no device attached")]
    NotAttached,

    /// An operation was requested with no open console session.
    #[error("console session is not open")]
    ConsoleUnavailable,

    /// The device token belongs to a superseded enumeration.
    ///
    /// Device lists are replaced wholesale on every poll; a stale token must
    /// not silently bind to whatever device now sits at the old index.
    #[error("stale device token {token:?}; re-enumerate and select again")]
    StaleDevice {
        /// The token that no longer resolves.
        token: DeviceToken,
    },

    /// Wire encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Transient errors resolve themselves once the in-flight request
    /// completes, a device is attached, or the caller re-selects a device.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(_) => true,
            Self::ProtocolBusy { .. }
            | Self::NotAttached
            | Self::ConsoleUnavailable
            | Self::StaleDevice { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_transient() {
        let err = BridgeError::ProtocolBusy { pending: Opcode::DeviceList };
        assert!(!err.is_fatal());
    }

    #[test]
    fn protocol_error_is_fatal() {
        let json = serde_json::from_str::<Vec<u8>>("{");
        let err = match json {
            Err(e) => BridgeError::Protocol(ProtocolError::Json(e)),
            Ok(_) => return,
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn error_display() {
        let err = BridgeError::ProtocolBusy { pending: Opcode::GetAddress };
        assert_eq!(err.to_string(), "protocol busy: GetAddress already in flight");
    }
}
