//! Runtime error types.

use bifrost_core::BridgeError;

/// Errors that can occur in the bridge runtime.
///
/// Transport faults never surface here; session tasks report them as events
/// and the bridge turns them into status updates.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Fatal error surfaced by the bridge state machine.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl From<bifrost_proto::ProtocolError> for RuntimeError {
    fn from(err: bifrost_proto::ProtocolError) -> Self {
        Self::Bridge(BridgeError::from(err))
    }
}
