//! Single-outstanding-request discipline for the console channel.
//!
//! The console daemon's replies carry no correlation identifier; the only
//! thing that makes a reply attributable is that the daemon answers in
//! request order and never reorders. `OpcodeGate` exploits that: it is a
//! pending-request table of capacity one. Each issued request mints a
//! [`RequestToken`], and the next inbound frame resolves whatever entry is
//! pending. Issuing while an entry is pending fails with `ProtocolBusy` —
//! the gate performs no queuing, only mutual exclusion, so any caller that
//! needs overlapping operations must queue above this layer.

use bifrost_proto::Opcode;

use crate::error::BridgeError;

/// Correlation token minted for each issued request.
///
/// Tokens are unique for the lifetime of the gate. They exist so that a
/// resolved reply can be matched back to the exact request that produced it,
/// even across a clear (session teardown) and re-issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

/// Why a `GetAddress` was issued; decides where the resolved bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPurpose {
    /// Identity fingerprint read for the server handshake.
    Fingerprint,
    /// Read requested by an external caller.
    Caller {
        /// Offset the caller asked for, echoed back on delivery.
        offset: u32,
    },
}

/// The operation a pending entry is awaiting a reply for.
///
/// Only reply-bearing opcodes appear here; `Attach` and `PutAddress` are
/// fire-and-forget on the wire and never occupy the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    /// Awaiting a device enumeration reply.
    DeviceList,
    /// Awaiting the post-attach liveness probe reply.
    Info,
    /// Awaiting a memory read reply.
    GetAddress(ReadPurpose),
}

impl PendingKind {
    /// The wire opcode this entry corresponds to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::DeviceList => Opcode::DeviceList,
            Self::Info => Opcode::Info,
            Self::GetAddress(_) => Opcode::GetAddress,
        }
    }
}

/// A request awaiting its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Correlation token minted at issue time.
    pub token: RequestToken,
    /// What the request was.
    pub kind: PendingKind,
}

/// Capacity-one pending-request table.
#[derive(Debug, Default)]
pub struct OpcodeGate {
    pending: Option<Pending>,
    next_token: u64,
}

impl OpcodeGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the in-flight slot for a request.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolBusy`] if a request is already
    /// pending. The existing entry is left untouched.
    pub fn issue(&mut self, kind: PendingKind) -> Result<RequestToken, BridgeError> {
        if let Some(pending) = &self.pending {
            return Err(BridgeError::ProtocolBusy { pending: pending.kind.opcode() });
        }

        let token = RequestToken(self.next_token);
        self.next_token += 1;
        self.pending = Some(Pending { token, kind });
        Ok(token)
    }

    /// Resolve the pending entry against an inbound frame.
    ///
    /// Returns `None` when nothing is pending — the caller logs and drops
    /// the frame; an out-of-band reply never mutates state.
    pub fn resolve(&mut self) -> Option<Pending> {
        self.pending.take()
    }

    /// Drop the pending entry, if any.
    ///
    /// Used on session teardown: a reply for the dropped entry can never
    /// arrive on a new session, so the slot must not stay occupied.
    pub fn clear(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(opcode = ?pending.kind.opcode(), "dropping dangling pending request");
        }
    }

    /// Opcode of the in-flight request, if any.
    pub fn pending_opcode(&self) -> Option<Opcode> {
        self.pending.as_ref().map(|p| p.kind.opcode())
    }

    /// Token of the in-flight request, if any.
    pub fn pending_token(&self) -> Option<RequestToken> {
        self.pending.as_ref().map(|p| p.token)
    }

    /// Whether a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_resolve() {
        let mut gate = OpcodeGate::new();

        let token = gate.issue(PendingKind::DeviceList).unwrap();
        assert!(gate.is_busy());
        assert_eq!(gate.pending_token(), Some(token));

        let pending = gate.resolve().unwrap();
        assert_eq!(pending.token, token);
        assert_eq!(pending.kind, PendingKind::DeviceList);
        assert!(!gate.is_busy());
    }

    #[test]
    fn second_issue_fails_busy_and_preserves_pending() {
        let mut gate = OpcodeGate::new();

        let token = gate.issue(PendingKind::Info).unwrap();
        let err = gate.issue(PendingKind::DeviceList).unwrap_err();
        assert!(matches!(err, BridgeError::ProtocolBusy { pending: Opcode::Info }));

        // The original entry must be untouched.
        let pending = gate.resolve().unwrap();
        assert_eq!(pending.token, token);
        assert_eq!(pending.kind, PendingKind::Info);
    }

    #[test]
    fn resolve_with_nothing_pending_is_none() {
        let mut gate = OpcodeGate::new();
        assert!(gate.resolve().is_none());
        assert!(gate.resolve().is_none());
    }

    #[test]
    fn tokens_are_unique_across_clear() {
        let mut gate = OpcodeGate::new();

        let first = gate.issue(PendingKind::DeviceList).unwrap();
        gate.clear();
        assert!(!gate.is_busy());

        let second = gate.issue(PendingKind::DeviceList).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn read_purpose_travels_with_the_entry() {
        let mut gate = OpcodeGate::new();

        gate.issue(PendingKind::GetAddress(ReadPurpose::Caller { offset: 0x7E_0010 })).unwrap();
        let pending = gate.resolve().unwrap();
        assert_eq!(
            pending.kind,
            PendingKind::GetAddress(ReadPurpose::Caller { offset: 0x7E_0010 })
        );
    }
}
