//! Bridge coordinator state machine.
//!
//! Sans-IO core of the bifrost bridge: a game client on one side, two
//! WebSocket peers on the other — a console-memory daemon speaking untagged
//! request/response JSON and a multiworld server speaking batched
//! cmd-tagged JSON. This crate decides everything and performs no I/O.
//!
//! # Architecture
//!
//! The bridge is a pure state machine:
//! - Receives [`BridgeEvent`]s from the driver (session lifecycle, inbound
//!   frames, caller requests, timer firings)
//! - Produces [`BridgeAction`]s for the driver to execute (connect, send,
//!   schedule, deliver)
//! - Uses the [`Environment`] trait for time and randomness (deterministic
//!   testing)
//!
//! # Components
//!
//! - [`Bridge`]: Top-level coordinator composing the pieces below
//! - [`OpcodeGate`]: Capacity-one pending-request table for the console's
//!   uncorrelated reply stream
//! - [`DeviceDirectory`]: Enumeration, token minting and two-step attachment
//! - [`MemoryGateway`]: Reads over the gate, two-phase writes
//! - [`HandshakeCoordinator`]: Fingerprint-based server authentication

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod directory;
mod env;
mod error;
mod event;
mod gate;
mod handshake;
mod memory;

pub use bridge::{Bridge, BridgeConfig, normalize_server_address};
pub use directory::{Device, DeviceDirectory, DeviceToken, DirectoryAction};
pub use env::Environment;
pub use error::BridgeError;
pub use event::{
    BridgeAction, BridgeEvent, ConsolePayload, DeviceSelector, Generation, StatusUpdate, Timer,
    TimerKind,
};
pub use gate::{OpcodeGate, Pending, PendingKind, ReadPurpose, RequestToken};
pub use handshake::{AuthState, HandshakeAction, HandshakeCoordinator};
pub use memory::{MemoryGateway, WriteSequence};
