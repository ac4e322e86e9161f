//! Cross-peer authentication handshake.
//!
//! The server admits a client only after proof of identity: a fingerprint
//! read from console memory, reversibly encoded and submitted in a `Connect`
//! command. The two connections synchronize at exactly this point, and the
//! two trigger events (room info from the server, device attachment on the
//! console side) can arrive in either order, which is why this is a state
//! machine and not a linear sequence:
//!
//! ```text
//! Idle → AwaitingRoomInfo → ReadingFingerprint → Authenticating → Authenticated
//!   ↑ (disconnect / refusal from any state)
//! ```
//!
//! If room info arrives while no device is attached, the coordinator stays
//! in `AwaitingRoomInfo`; a later attachment does not retroactively
//! authenticate — only a fresh room info does. This mirrors the daemon
//! ecosystem's established behavior and is verified by tests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bifrost_proto::{ClientCommand, NetworkVersion, RoomInfo};

use crate::env::Environment;

/// Game identity declared in the `Connect` command.
const GAME_NAME: &str = "A Link to the Past";

/// Capability tags declared in the `Connect` command.
const CLIENT_TAGS: &[&str] = &["LttP Client"];

/// Client protocol version declared in the `Connect` command.
const CLIENT_VERSION: (u32, u32, u32) = (0, 0, 3);

/// Authentication progress against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No server session, or the last one ended.
    Idle,
    /// Server session open, waiting for room info.
    AwaitingRoomInfo,
    /// Fingerprint read issued on the console channel.
    ReadingFingerprint,
    /// `Connect` sent, waiting for the verdict.
    Authenticating,
    /// The server accepted the client.
    Authenticated,
}

/// Directives returned by the coordinator for the bridge to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Read the identity fingerprint from console memory.
    ReadFingerprint,
    /// Submit the authentication command to the server.
    SendConnect(ClientCommand),
}

/// Sequences the cross-peer handshake.
#[derive(Debug)]
pub struct HandshakeCoordinator {
    state: AuthState,
    /// Last room metadata, replaced wholesale on each room info.
    room: Option<RoomInfo>,
    password: Option<String>,
}

impl HandshakeCoordinator {
    /// Create an idle coordinator.
    pub fn new() -> Self {
        Self { state: AuthState::Idle, room: None, password: None }
    }

    /// Current authentication state.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Last received room metadata, if any.
    pub fn room(&self) -> Option<&RoomInfo> {
        self.room.as_ref()
    }

    /// Set the password submitted with the next `Connect`.
    pub fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    /// The server session opened.
    pub fn on_server_open(&mut self) {
        self.state = AuthState::AwaitingRoomInfo;
    }

    /// Room info arrived; begins the fingerprint read when a device is
    /// attached, otherwise authentication stays deferred.
    pub fn on_room_info(&mut self, info: RoomInfo, attached: bool) -> Vec<HandshakeAction> {
        self.room = Some(info);

        match self.state {
            AuthState::Idle | AuthState::AwaitingRoomInfo => {
                if attached {
                    self.state = AuthState::ReadingFingerprint;
                    vec![HandshakeAction::ReadFingerprint]
                } else {
                    self.state = AuthState::AwaitingRoomInfo;
                    Vec::new()
                }
            },
            // A handshake is already in motion (or done); just keep the
            // refreshed room metadata.
            AuthState::ReadingFingerprint
            | AuthState::Authenticating
            | AuthState::Authenticated => Vec::new(),
        }
    }

    /// The fingerprint read resolved: build and submit `Connect`.
    pub fn on_fingerprint<E: Environment>(
        &mut self,
        env: &E,
        fingerprint: &[u8],
    ) -> Vec<HandshakeAction> {
        if self.state != AuthState::ReadingFingerprint {
            tracing::warn!(state = ?self.state, "fingerprint resolved outside a handshake");
            return Vec::new();
        }

        let (major, minor, build) = CLIENT_VERSION;
        let connect = ClientCommand::Connect {
            game: GAME_NAME.to_owned(),
            name: BASE64.encode(fingerprint),
            uuid: uuid::Uuid::from_u128(env.random_u128()).to_string(),
            tags: CLIENT_TAGS.iter().map(|&t| t.to_owned()).collect(),
            password: self.password.clone(),
            version: NetworkVersion::new(major, minor, build),
        };

        self.state = AuthState::Authenticating;
        vec![HandshakeAction::SendConnect(connect)]
    }

    /// The fingerprint read could not complete; wait for fresh room info.
    pub fn on_read_failed(&mut self) {
        if self.state == AuthState::ReadingFingerprint {
            self.state = AuthState::AwaitingRoomInfo;
        }
    }

    /// The server accepted the `Connect`.
    pub fn on_connected(&mut self) {
        if self.state != AuthState::Authenticating {
            tracing::warn!(state = ?self.state, "Connected received outside authentication");
        }
        self.state = AuthState::Authenticated;
    }

    /// The server refused the `Connect`.
    pub fn on_refused(&mut self, errors: &[String]) {
        tracing::warn!(?errors, "server refused the connection");
        self.state = AuthState::Idle;
    }

    /// The server session ended.
    pub fn on_server_closed(&mut self) {
        self.state = AuthState::Idle;
    }

    /// The console session ended; abandon a read in progress.
    pub fn on_console_lost(&mut self) {
        self.on_read_failed();
    }
}

impl Default for HandshakeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
