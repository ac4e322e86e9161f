//! Bridge events and actions.
//!
//! The bridge is a pure state machine: the driver feeds it [`BridgeEvent`]s
//! (session lifecycle, inbound frames, caller requests, timer firings) and
//! executes the [`BridgeAction`]s it returns. Console-scoped events, actions
//! and timers carry the generation of the session they belong to; the bridge
//! ignores anything stamped with a superseded generation, which is what
//! makes delayed continuations (attach probes, write payloads) safe across
//! reconnects.

use std::time::Duration;

use bifrost_proto::{ClientCommand, ConsoleRequest, RoomInfo};

use crate::{
    directory::{Device, DeviceToken},
    gate::RequestToken,
    handshake::AuthState,
};

/// Monotonic identity of one console session.
///
/// A reconnect always creates a new session with a higher generation; a
/// closed session's generation is never reused.
pub type Generation = u64;

/// One inbound frame from the console daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolePayload {
    /// JSON text frame (`Results` replies).
    Text(String),
    /// Raw binary frame (`GetAddress` replies).
    Binary(Vec<u8>),
}

/// How a caller names the device to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// A token from the current enumeration.
    Token(DeviceToken),
    /// A device URI, e.g. from configuration; attachment resumes when the
    /// URI appears in an enumeration.
    Uri(String),
}

/// Everything that can happen to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Caller asked for a (re)connection to the console daemon.
    ConsoleConnectRequested,
    /// The console session finished connecting.
    ConsoleOpen {
        /// Session this event belongs to.
        generation: Generation,
    },
    /// A frame arrived on the console session.
    ConsoleMessage {
        /// Session this event belongs to.
        generation: Generation,
        /// The frame.
        payload: ConsolePayload,
    },
    /// The console session reported a transport fault.
    ConsoleError {
        /// Session this event belongs to.
        generation: Generation,
        /// Human-readable fault description.
        detail: String,
    },
    /// The console session ended. Terminal for that generation.
    ConsoleClosed {
        /// Session this event belongs to.
        generation: Generation,
        /// Whether the close was clean.
        clean: bool,
    },
    /// Caller selected a device.
    AttachRequested {
        /// Which device.
        selector: DeviceSelector,
    },
    /// Caller reset the device selection.
    DetachRequested,
    /// Caller asked for a memory read.
    ReadRequested {
        /// Start offset.
        offset: u32,
        /// Byte count.
        len: u32,
    },
    /// Caller asked for a memory write.
    WriteRequested {
        /// Start offset.
        offset: u32,
        /// Declared byte count.
        len: u32,
        /// Bytes for the payload frame.
        data: Vec<u8>,
    },
    /// Caller asked for a server connection.
    ServerConnectRequested {
        /// Server address, port optional.
        address: String,
        /// Room password, if any.
        password: Option<String>,
    },
    /// The server session finished connecting.
    ServerOpen,
    /// A text message arrived on the server session.
    ServerMessage {
        /// Raw message body (a JSON command batch).
        text: String,
    },
    /// The server session reported a transport fault.
    ServerError {
        /// Human-readable fault description.
        detail: String,
    },
    /// The server session ended.
    ServerClosed {
        /// Whether the close was clean.
        clean: bool,
    },
    /// A scheduled delay elapsed.
    TimerFired(Timer),
}

/// A scheduled continuation, stamped with the console generation current at
/// schedule time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Generation captured when the timer was scheduled.
    pub generation: Generation,
    /// What to do when it fires.
    pub kind: TimerKind,
}

/// The continuation a timer carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Re-poll the device enumeration.
    DevicePoll,
    /// Send the post-attach `Info` liveness probe.
    AttachProbe,
    /// Deadline for the `Info` probe reply; fails the attach if the probe
    /// issued with this token is still pending.
    ProbeTimeout {
        /// Token minted when the probe was issued.
        token: RequestToken,
    },
    /// Send the raw payload frame of a two-phase write.
    WritePayload {
        /// Bytes to send.
        data: Vec<u8>,
    },
}

/// What the driver must do on the bridge's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    /// Open a new console session for this generation.
    ConnectConsole {
        /// Generation assigned to the new session.
        generation: Generation,
    },
    /// Close the console session of this generation.
    CloseConsole {
        /// Session to close.
        generation: Generation,
    },
    /// Send a JSON frame on the console session.
    SendConsole {
        /// Session the frame belongs to; dropped if superseded.
        generation: Generation,
        /// Frame to send.
        frame: ConsoleRequest,
    },
    /// Send a raw binary frame on the console session.
    SendConsoleRaw {
        /// Session the frame belongs to; dropped if superseded.
        generation: Generation,
        /// Bytes to send.
        data: Vec<u8>,
    },
    /// Open the server session to this address.
    ConnectServer {
        /// Normalized `host:port` address.
        address: String,
    },
    /// Send a command batch on the server session.
    SendServer {
        /// Commands for one batched text message.
        commands: Vec<ClientCommand>,
    },
    /// Fire the timer after the delay.
    Schedule {
        /// The continuation.
        timer: Timer,
        /// Delay before firing.
        after: Duration,
    },
    /// Hand resolved read bytes to the caller.
    DeliverMemory {
        /// Offset the caller asked for.
        offset: u32,
        /// The bytes.
        data: Vec<u8>,
    },
    /// Update the status display collaborator.
    Status(StatusUpdate),
}

/// Display-surface updates; rendering is an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The selectable device list was replaced.
    Devices(Vec<Device>),
    /// A device attachment was confirmed.
    Attached {
        /// URI of the attached device.
        uri: String,
    },
    /// The attachment was cleared.
    Detached,
    /// An attach probe failed; still disconnected.
    AttachFailed {
        /// URI of the device that failed.
        uri: String,
    },
    /// Fresh room metadata from the server.
    Room(RoomInfo),
    /// Authentication progress changed.
    Auth(AuthState),
    /// The console transport faulted; reconnection is never automatic.
    ConsoleFault {
        /// Fault description.
        detail: String,
    },
    /// The server transport faulted.
    ServerFault {
        /// Fault description.
        detail: String,
    },
}
