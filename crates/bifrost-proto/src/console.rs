//! Console daemon wire frames.
//!
//! Requests are JSON text frames of the shape
//! `{"Opcode": "...", "Space": "SNES", "Operands": [...]}`. The daemon
//! replies to `DeviceList` and `Info` with a JSON `{"Results": [...]}`
//! frame; `GetAddress` resolves with a raw binary frame carrying the
//! requested bytes. `Attach` and `PutAddress` are never acknowledged, and a
//! write is two frames: the command frame followed by the raw payload.
//!
//! Memory operands are rendered as uppercase hex strings, matching the
//! daemon's existing client ecosystem.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Named operation in the console daemon protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Enumerate available devices.
    DeviceList,
    /// Bind this connection to a device. Not acknowledged.
    Attach,
    /// Query device information; doubles as a liveness probe after attach.
    Info,
    /// Read a memory range. Resolves with a raw binary frame.
    GetAddress,
    /// Write a memory range. Command frame only; payload follows separately.
    PutAddress,
}

impl Opcode {
    /// Whether the daemon sends a response frame for this opcode.
    pub fn expects_reply(self) -> bool {
        match self {
            Self::DeviceList | Self::Info | Self::GetAddress => true,
            Self::Attach | Self::PutAddress => false,
        }
    }
}

/// Address space selector. Only the console space is used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    /// Console memory space.
    #[serde(rename = "SNES")]
    Snes,
}

/// A single request frame to the console daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleRequest {
    /// Operation to perform.
    #[serde(rename = "Opcode")]
    pub opcode: Opcode,
    /// Address space the operation targets.
    #[serde(rename = "Space")]
    pub space: Space,
    /// Operation-specific operands (device URIs, hex offsets and lengths).
    #[serde(rename = "Operands", default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
}

impl ConsoleRequest {
    fn new(opcode: Opcode, operands: Vec<String>) -> Self {
        Self { opcode, space: Space::Snes, operands }
    }

    /// Request the device enumeration.
    pub fn device_list() -> Self {
        Self::new(Opcode::DeviceList, Vec::new())
    }

    /// Bind the connection to the device with the given URI.
    pub fn attach(device_uri: &str) -> Self {
        Self::new(Opcode::Attach, vec![device_uri.to_owned()])
    }

    /// Query information about the attached device.
    pub fn info() -> Self {
        Self::new(Opcode::Info, Vec::new())
    }

    /// Read `len` bytes starting at `offset`.
    pub fn get_address(offset: u32, len: u32) -> Self {
        Self::new(Opcode::GetAddress, vec![format!("{offset:X}"), format!("{len:X}")])
    }

    /// Announce a write of `len` bytes starting at `offset`. The raw data
    /// must follow as a separate binary frame.
    pub fn put_address(offset: u32, len: u32) -> Self {
        Self::new(Opcode::PutAddress, vec![format!("{offset:X}"), format!("{len:X}")])
    }

    /// Encode this request as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A JSON reply frame from the console daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleReply {
    /// Result strings; device URIs for `DeviceList`, firmware/feature
    /// strings for `Info`.
    #[serde(rename = "Results", default)]
    pub results: Vec<String>,
}

impl ConsoleReply {
    /// Decode a JSON reply frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
