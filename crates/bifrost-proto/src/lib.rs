//! Wire types for the two Bifrost peers.
//!
//! The console daemon speaks an untagged JSON request/response protocol:
//! requests carry `{Opcode, Space, Operands}`, replies carry `{Results}`.
//! There is no correlation identifier on the wire; the daemon answers in
//! request order, which is why the core enforces a single in-flight request.
//!
//! The multiworld server sends one JSON array of command objects per
//! WebSocket message, each discriminated by a `cmd` field.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod console;
pub mod error;
pub mod server;

pub use console::{ConsoleReply, ConsoleRequest, Opcode, Space};
pub use error::ProtocolError;
pub use server::{
    ClientCommand, NetworkVersion, RoomInfo, ServerCommand, decode_batch, encode_batch,
};
