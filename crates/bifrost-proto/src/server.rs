//! Multiworld server wire commands.
//!
//! Every WebSocket text message from the server is a JSON array of command
//! objects, each discriminated by a `cmd` field. The bridge consumes only a
//! handful of commands; everything else in a batch is logged and skipped so
//! that protocol growth on the server side never breaks the client.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Semantic protocol version triple.
///
/// Outgoing messages also carry the server's `class` marker field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Build number.
    pub build: u32,
    /// Type marker required by the server's deserializer.
    #[serde(default = "version_class")]
    pub class: String,
}

fn version_class() -> String {
    "Version".to_owned()
}

impl NetworkVersion {
    /// Version triple with the standard `class` marker.
    pub fn new(major: u32, minor: u32, build: u32) -> Self {
        Self { major, minor, build, class: version_class() }
    }
}

/// Room configuration announced by the server after the connection opens.
///
/// Receipt of this command is the authentication trigger: the client must
/// answer with [`ClientCommand::Connect`] carrying the identity fingerprint
/// read from console memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Server protocol version.
    pub version: NetworkVersion,
    /// Forfeit policy for the room.
    pub forfeit_mode: String,
    /// Remaining-items policy for the room.
    pub remaining_mode: String,
    /// Hint cost in collected checks.
    pub hint_cost: u32,
    /// Points awarded per location check.
    pub location_check_points: u32,
}

/// Inbound server command, discriminated by `cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerCommand {
    /// Room metadata; triggers authentication.
    RoomInfo(RoomInfo),
    /// The server accepted the client's `Connect`.
    Connected,
    /// The server refused the client's `Connect`.
    ConnectionRefused {
        /// Refusal reasons, if the server provided any.
        #[serde(default)]
        errors: Vec<String>,
    },
}

/// Outbound client command, discriminated by `cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClientCommand {
    /// Authentication request, answered with `Connected` or
    /// `ConnectionRefused`.
    Connect {
        /// Game the client is bridging.
        game: String,
        /// Reversibly encoded identity fingerprint read from console memory.
        name: String,
        /// Fresh per-instance client identifier.
        uuid: String,
        /// Declared capability tags.
        tags: Vec<String>,
        /// Room password, if any.
        password: Option<String>,
        /// Client protocol version.
        version: NetworkVersion,
    },
}

/// Decode one server message into the commands this client understands.
///
/// Unknown `cmd` values are logged at debug level and skipped; a message
/// that is not a JSON array at all is an error.
pub fn decode_batch(text: &str) -> Result<Vec<ServerCommand>, ProtocolError> {
    let serde_json::Value::Array(values) = serde_json::from_str::<serde_json::Value>(text)? else {
        return Err(ProtocolError::NotABatch);
    };

    let mut commands = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<ServerCommand>(value.clone()) {
            Ok(command) => commands.push(command),
            Err(_) => {
                let cmd = value.get("cmd").and_then(serde_json::Value::as_str).unwrap_or("<none>");
                tracing::debug!(cmd, "skipping unhandled server command");
            },
        }
    }

    Ok(commands)
}

/// Encode outbound commands as one batched text message.
pub fn encode_batch(commands: &[ClientCommand]) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(commands)?)
}
