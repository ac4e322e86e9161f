//! Memory access over the opcode gate.
//!
//! Reads ride the gate: `GetAddress` occupies the pending slot until the
//! daemon's binary reply resolves it. Writes are fire-and-forget on the wire
//! but two-phase in time: the daemon requires the `PutAddress` command frame
//! and the raw payload to arrive as two related-but-separate frames, and it
//! never acknowledges the split, so the payload is sent after a fixed settle
//! delay. Ranges pass through unvalidated; the daemon enforces its own
//! bounds.

use bifrost_proto::ConsoleRequest;

use crate::{
    error::BridgeError,
    gate::{OpcodeGate, PendingKind, ReadPurpose},
};

/// A two-phase write: command frame now, raw payload after the settle delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSequence {
    /// The `PutAddress` command frame.
    pub command: ConsoleRequest,
    /// Raw bytes to send as the follow-up binary frame.
    pub payload: Vec<u8>,
}

/// Read/write-by-address operations for the attached device.
#[derive(Debug, Default)]
pub struct MemoryGateway;

impl MemoryGateway {
    /// Create the gateway.
    pub fn new() -> Self {
        Self
    }

    /// Begin a read of `len` bytes at `offset`.
    ///
    /// Occupies the gate; the resolved bytes are routed by `purpose`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotAttached`] if no device attachment is live, or
    /// [`BridgeError::ProtocolBusy`] if a request is already in flight.
    pub fn read(
        &self,
        gate: &mut OpcodeGate,
        attached: bool,
        offset: u32,
        len: u32,
        purpose: ReadPurpose,
    ) -> Result<ConsoleRequest, BridgeError> {
        if !attached {
            return Err(BridgeError::NotAttached);
        }

        gate.issue(PendingKind::GetAddress(purpose))?;
        Ok(ConsoleRequest::get_address(offset, len))
    }

    /// Begin a write of `data` at `offset`, declaring `len` bytes.
    ///
    /// Does not occupy the gate (the daemon sends no reply for writes), but
    /// callers must still serialize writes against reads themselves; the
    /// daemon consumes the payload frame positionally.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotAttached`] if no device attachment is live.
    pub fn write(
        &self,
        attached: bool,
        offset: u32,
        len: u32,
        data: Vec<u8>,
    ) -> Result<WriteSequence, BridgeError> {
        if !attached {
            return Err(BridgeError::NotAttached);
        }

        Ok(WriteSequence { command: ConsoleRequest::put_address(offset, len), payload: data })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bifrost_proto::Opcode;

    use super::*;

    #[test]
    fn read_requires_attachment() {
        let gateway = MemoryGateway::new();
        let mut gate = OpcodeGate::new();

        let err = gateway.read(&mut gate, false, 0xE0_2000, 0x15, ReadPurpose::Fingerprint);
        assert!(matches!(err, Err(BridgeError::NotAttached)));
        assert!(!gate.is_busy());
    }

    #[test]
    fn read_occupies_the_gate() {
        let gateway = MemoryGateway::new();
        let mut gate = OpcodeGate::new();

        let frame = gateway
            .read(&mut gate, true, 0xE0_2000, 0x15, ReadPurpose::Fingerprint)
            .unwrap();
        assert_eq!(frame.opcode, Opcode::GetAddress);
        assert_eq!(frame.operands, vec!["E02000".to_owned(), "15".to_owned()]);
        assert!(gate.is_busy());

        let err = gateway.read(&mut gate, true, 0, 1, ReadPurpose::Caller { offset: 0 });
        assert!(matches!(err, Err(BridgeError::ProtocolBusy { .. })));
    }

    #[test]
    fn write_requires_attachment() {
        let gateway = MemoryGateway::new();
        let err = gateway.write(false, 0x7E_0010, 2, vec![1, 2]);
        assert!(matches!(err, Err(BridgeError::NotAttached)));
    }

    #[test]
    fn write_builds_command_and_payload() {
        let gateway = MemoryGateway::new();
        let mut gate = OpcodeGate::new();

        let sequence = gateway.write(true, 0x7E_0010, 2, vec![0xAB, 0xCD]).unwrap();
        assert_eq!(sequence.command.opcode, Opcode::PutAddress);
        assert_eq!(sequence.command.operands, vec!["7E0010".to_owned(), "2".to_owned()]);
        assert_eq!(sequence.payload, vec![0xAB, 0xCD]);

        // Writes never occupy the gate.
        assert!(!gate.is_busy());
        gate.issue(PendingKind::DeviceList).unwrap();
    }
}
