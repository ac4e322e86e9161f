//! The dual-transport bridge coordinator.
//!
//! `Bridge` composes the opcode gate, the device directory, the memory
//! gateway and the handshake coordinator into one event→action state
//! machine. It owns the console-session generation counter: every
//! console-scoped event, send and timer is stamped with a generation, and
//! anything stamped with a superseded generation is ignored, so a delayed
//! probe or write payload scheduled against a session that has since been
//! replaced becomes a no-op instead of acting on the wrong socket.
//!
//! The two peers are independent except for two explicit couplings, both
//! modeled as single transitions here: room info plus a live attachment
//! starts the fingerprint read, and a confirmed attachment plus a known
//! server address reopens the server session.

use std::time::Duration;

use bifrost_proto::{ConsoleReply, ConsoleRequest, ServerCommand, decode_batch};

use crate::{
    directory::{DeviceDirectory, DirectoryAction},
    env::Environment,
    error::BridgeError,
    event::{
        BridgeAction, BridgeEvent, ConsolePayload, DeviceSelector, Generation, StatusUpdate,
        Timer, TimerKind,
    },
    gate::{OpcodeGate, PendingKind, ReadPurpose},
    handshake::{AuthState, HandshakeAction, HandshakeCoordinator},
    memory::MemoryGateway,
};

/// Timing and layout knobs for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Discovery re-poll interval while the device list is empty.
    pub poll_interval: Duration,
    /// Settle delay between the `Attach` frame and the `Info` probe; the
    /// daemon completes attachment asynchronously.
    pub attach_settle: Duration,
    /// Deadline for the `Info` probe reply; an unanswered probe fails the
    /// attach and frees the request slot.
    pub probe_timeout: Duration,
    /// Settle delay between the `PutAddress` command frame and the raw
    /// payload frame.
    pub write_settle: Duration,
    /// Offset of the identity fingerprint in console memory.
    pub fingerprint_offset: u32,
    /// Length of the identity fingerprint.
    pub fingerprint_len: u32,
    /// Port appended to a server address that names none.
    pub default_server_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            attach_settle: Duration::from_millis(250),
            probe_timeout: Duration::from_secs(3),
            write_settle: Duration::from_millis(100),
            fingerprint_offset: 0x00E0_2000,
            fingerprint_len: 0x15,
            default_server_port: 38281,
        }
    }
}

/// The bridge coordinator state machine.
///
/// Pure state machine: `handle` returns actions, the caller performs I/O.
pub struct Bridge<E: Environment> {
    env: E,
    config: BridgeConfig,
    gate: OpcodeGate,
    directory: DeviceDirectory,
    memory: MemoryGateway,
    handshake: HandshakeCoordinator,
    /// Generation of the newest console session; 0 means none was ever
    /// requested.
    generation: Generation,
    console_open: bool,
    server_address: Option<String>,
    server_open: bool,
}

impl<E: Environment> Bridge<E> {
    /// Create an idle bridge.
    pub fn new(env: E, config: BridgeConfig) -> Self {
        Self {
            env,
            config,
            gate: OpcodeGate::new(),
            directory: DeviceDirectory::new(),
            memory: MemoryGateway::new(),
            handshake: HandshakeCoordinator::new(),
            generation: 0,
            console_open: false,
            server_address: None,
            server_open: false,
        }
    }

    /// Generation of the current console session.
    pub fn console_generation(&self) -> Generation {
        self.generation
    }

    /// Whether a device attachment is live (session open and confirmed).
    pub fn is_attached(&self) -> bool {
        self.console_open && self.directory.is_attached()
    }

    /// Current authentication state.
    pub fn auth_state(&self) -> AuthState {
        self.handshake.state()
    }

    /// Currently enumerated devices.
    pub fn devices(&self) -> &[crate::directory::Device] {
        self.directory.devices()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError` only for caller-initiated events (attach, read,
    /// write); inbound faults are logged and surfaced as status actions.
    pub fn handle(&mut self, event: BridgeEvent) -> Result<Vec<BridgeAction>, BridgeError> {
        match event {
            BridgeEvent::ConsoleConnectRequested => Ok(self.connect_console()),
            BridgeEvent::ConsoleOpen { generation } => Ok(self.on_console_open(generation)),
            BridgeEvent::ConsoleMessage { generation, payload } => {
                Ok(self.on_console_message(generation, payload))
            },
            BridgeEvent::ConsoleError { generation, detail } => {
                Ok(self.on_console_error(generation, detail))
            },
            BridgeEvent::ConsoleClosed { generation, clean } => {
                Ok(self.on_console_closed(generation, clean))
            },
            BridgeEvent::AttachRequested { selector } => self.on_attach_requested(selector),
            BridgeEvent::DetachRequested => Ok(self.on_detach_requested()),
            BridgeEvent::ReadRequested { offset, len } => self.on_read_requested(offset, len),
            BridgeEvent::WriteRequested { offset, len, data } => {
                self.on_write_requested(offset, len, data)
            },
            BridgeEvent::ServerConnectRequested { address, password } => {
                Ok(self.on_server_connect_requested(address, password))
            },
            BridgeEvent::ServerOpen => Ok(self.on_server_open()),
            BridgeEvent::ServerMessage { text } => Ok(self.on_server_message(&text)),
            BridgeEvent::ServerError { detail } => {
                Ok(vec![BridgeAction::Status(StatusUpdate::ServerFault { detail })])
            },
            BridgeEvent::ServerClosed { clean } => Ok(self.on_server_closed(clean)),
            BridgeEvent::TimerFired(timer) => Ok(self.on_timer(timer)),
        }
    }

    fn connect_console(&mut self) -> Vec<BridgeAction> {
        // A closed session is terminal; reconnecting always replaces it.
        self.generation += 1;
        self.console_open = false;
        self.gate.clear();
        vec![BridgeAction::ConnectConsole { generation: self.generation }]
    }

    fn on_console_open(&mut self, generation: Generation) -> Vec<BridgeAction> {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "open from stale session");
            return Vec::new();
        }

        self.console_open = true;
        let directory_actions = self.directory.on_console_open();
        self.apply_directory_actions(directory_actions)
    }

    fn on_console_message(
        &mut self,
        generation: Generation,
        payload: ConsolePayload,
    ) -> Vec<BridgeAction> {
        if generation != self.generation || !self.console_open {
            tracing::debug!(generation, "dropping frame from stale console session");
            return Vec::new();
        }

        let Some(pending) = self.gate.resolve() else {
            // Out-of-band frame: logged and dropped, never a crash and
            // never a state mutation.
            tracing::warn!("console frame with no request pending; dropping");
            return Vec::new();
        };

        match pending.kind {
            PendingKind::DeviceList => self.on_device_list_reply(&payload),
            PendingKind::Info => self.on_info_reply(&payload),
            PendingKind::GetAddress(purpose) => self.on_read_reply(purpose, payload),
        }
    }

    fn on_device_list_reply(&mut self, payload: &ConsolePayload) -> Vec<BridgeAction> {
        let ConsolePayload::Text(text) = payload else {
            tracing::warn!("binary frame while awaiting DeviceList; dropping");
            return Vec::new();
        };

        let reply = match ConsoleReply::decode(text) {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(%error, "undecodable DeviceList reply");
                return Vec::new();
            },
        };

        let directory_actions = self.directory.replace_list(reply.results);
        let mut actions =
            vec![BridgeAction::Status(StatusUpdate::Devices(self.directory.devices().to_vec()))];
        actions.extend(self.apply_directory_actions(directory_actions));
        actions
    }

    fn on_info_reply(&mut self, payload: &ConsolePayload) -> Vec<BridgeAction> {
        let ok = match payload {
            ConsolePayload::Text(text) => ConsoleReply::decode(text).is_ok(),
            ConsolePayload::Binary(_) => false,
        };

        let directory_actions = self.directory.on_info_result(ok);
        self.apply_directory_actions(directory_actions)
    }

    fn on_read_reply(&mut self, purpose: ReadPurpose, payload: ConsolePayload) -> Vec<BridgeAction> {
        let ConsolePayload::Binary(data) = payload else {
            tracing::warn!("text frame while awaiting GetAddress bytes; dropping");
            self.handshake.on_read_failed();
            return Vec::new();
        };

        match purpose {
            ReadPurpose::Fingerprint => {
                let handshake_actions = self.handshake.on_fingerprint(&self.env, &data);
                self.apply_handshake_actions(handshake_actions)
            },
            ReadPurpose::Caller { offset } => {
                vec![BridgeAction::DeliverMemory { offset, data }]
            },
        }
    }

    fn on_console_error(&mut self, generation: Generation, detail: String) -> Vec<BridgeAction> {
        if generation != self.generation {
            return Vec::new();
        }

        // Surfaced to the display; reconnection stays user- or
        // discovery-initiated so a hardware fault is never masked.
        tracing::error!(%detail, "console transport fault");
        vec![BridgeAction::Status(StatusUpdate::ConsoleFault { detail })]
    }

    fn on_console_closed(&mut self, generation: Generation, clean: bool) -> Vec<BridgeAction> {
        if generation != self.generation {
            return Vec::new();
        }

        if clean {
            tracing::info!("console session closed cleanly");
        } else {
            tracing::warn!("console session closed dirty");
        }

        self.console_open = false;
        self.gate.clear();
        self.directory.on_console_closed();
        self.handshake.on_console_lost();
        vec![BridgeAction::Status(StatusUpdate::Detached)]
    }

    fn on_attach_requested(
        &mut self,
        selector: DeviceSelector,
    ) -> Result<Vec<BridgeAction>, BridgeError> {
        if self.console_open {
            let directory_actions = match selector {
                DeviceSelector::Token(token) => self.directory.request_attach(token)?,
                DeviceSelector::Uri(uri) => self.directory.request_attach_by_uri(uri),
            };
            return Ok(self.apply_directory_actions(directory_actions));
        }

        // No live session: remember the request and reconnect; the new
        // session's enumeration resumes it.
        match selector {
            DeviceSelector::Token(token) => Err(BridgeError::StaleDevice { token }),
            DeviceSelector::Uri(uri) => {
                self.directory.request_attach_by_uri(uri);
                Ok(self.connect_console())
            },
        }
    }

    fn on_detach_requested(&mut self) -> Vec<BridgeAction> {
        self.directory.detach();

        let mut actions = Vec::new();
        if self.console_open {
            actions.push(BridgeAction::CloseConsole { generation: self.generation });
        }
        actions.push(BridgeAction::Status(StatusUpdate::Detached));
        actions
    }

    fn on_read_requested(
        &mut self,
        offset: u32,
        len: u32,
    ) -> Result<Vec<BridgeAction>, BridgeError> {
        if !self.console_open {
            return Err(BridgeError::ConsoleUnavailable);
        }

        let frame = self.memory.read(
            &mut self.gate,
            self.directory.is_attached(),
            offset,
            len,
            ReadPurpose::Caller { offset },
        )?;
        Ok(vec![self.send_console(frame)])
    }

    fn on_write_requested(
        &mut self,
        offset: u32,
        len: u32,
        data: Vec<u8>,
    ) -> Result<Vec<BridgeAction>, BridgeError> {
        if !self.console_open {
            return Err(BridgeError::ConsoleUnavailable);
        }

        let sequence = self.memory.write(self.directory.is_attached(), offset, len, data)?;
        Ok(vec![
            self.send_console(sequence.command),
            self.schedule(TimerKind::WritePayload { data: sequence.payload }, self.config.write_settle),
        ])
    }

    fn on_server_connect_requested(
        &mut self,
        address: String,
        password: Option<String>,
    ) -> Vec<BridgeAction> {
        let address = normalize_server_address(&address, self.config.default_server_port);
        self.server_address = Some(address.clone());
        self.server_open = false;
        self.handshake.set_password(password);
        vec![BridgeAction::ConnectServer { address }]
    }

    fn on_server_open(&mut self) -> Vec<BridgeAction> {
        self.server_open = true;
        self.handshake.on_server_open();
        vec![BridgeAction::Status(StatusUpdate::Auth(self.handshake.state()))]
    }

    fn on_server_message(&mut self, text: &str) -> Vec<BridgeAction> {
        let commands = match decode_batch(text) {
            Ok(commands) => commands,
            Err(error) => {
                tracing::warn!(%error, "undecodable server message; dropping");
                return Vec::new();
            },
        };

        let mut actions = Vec::new();
        for command in commands {
            match command {
                ServerCommand::RoomInfo(info) => {
                    actions.push(BridgeAction::Status(StatusUpdate::Room(info.clone())));
                    let handshake_actions =
                        self.handshake.on_room_info(info, self.is_attached());
                    actions.extend(self.apply_handshake_actions(handshake_actions));
                },
                ServerCommand::Connected => {
                    self.handshake.on_connected();
                    actions.push(BridgeAction::Status(StatusUpdate::Auth(self.handshake.state())));
                },
                ServerCommand::ConnectionRefused { errors } => {
                    self.handshake.on_refused(&errors);
                    actions.push(BridgeAction::Status(StatusUpdate::ServerFault {
                        detail: format!("connection refused: {}", errors.join(", ")),
                    }));
                    actions.push(BridgeAction::Status(StatusUpdate::Auth(self.handshake.state())));
                },
            }
        }
        actions
    }

    fn on_server_closed(&mut self, clean: bool) -> Vec<BridgeAction> {
        self.server_open = false;
        self.handshake.on_server_closed();

        let mut actions = Vec::new();
        if !clean {
            actions.push(BridgeAction::Status(StatusUpdate::ServerFault {
                detail: "server connection closed unexpectedly".to_owned(),
            }));
        }
        actions.push(BridgeAction::Status(StatusUpdate::Auth(self.handshake.state())));
        actions
    }

    fn on_timer(&mut self, timer: Timer) -> Vec<BridgeAction> {
        // A continuation scheduled against a replaced session is a no-op.
        if timer.generation != self.generation || !self.console_open {
            tracing::debug!(?timer, "timer for stale console session; ignoring");
            return Vec::new();
        }

        match timer.kind {
            TimerKind::DevicePoll => {
                let directory_actions = self.directory.on_poll_timer();
                self.apply_directory_actions(directory_actions)
            },
            TimerKind::AttachProbe => {
                let directory_actions = self.directory.on_probe_timer();
                self.apply_directory_actions(directory_actions)
            },
            TimerKind::ProbeTimeout { token } => {
                // Deadlines outlive their probe; only an entry still waiting
                // on this exact token can be failed by one.
                if self.gate.pending_token() == Some(token) {
                    tracing::warn!("attach probe went unanswered; abandoning attach");
                    self.gate.clear();
                    let directory_actions = self.directory.on_info_result(false);
                    self.apply_directory_actions(directory_actions)
                } else {
                    Vec::new()
                }
            },
            TimerKind::WritePayload { data } => {
                vec![BridgeAction::SendConsoleRaw { generation: self.generation, data }]
            },
        }
    }

    fn apply_directory_actions(&mut self, directory_actions: Vec<DirectoryAction>) -> Vec<BridgeAction> {
        let mut actions = Vec::new();
        for directory_action in directory_actions {
            match directory_action {
                DirectoryAction::RequestList => match self.gate.issue(PendingKind::DeviceList) {
                    Ok(_) => actions.push(self.send_console(ConsoleRequest::device_list())),
                    Err(error) => {
                        // Enumeration is the one retried operation; try
                        // again after the interval instead of surfacing.
                        tracing::warn!(%error, "gate busy at enumeration; re-polling");
                        actions
                            .push(self.schedule(TimerKind::DevicePoll, self.config.poll_interval));
                    },
                },
                DirectoryAction::SchedulePoll => {
                    actions.push(self.schedule(TimerKind::DevicePoll, self.config.poll_interval));
                },
                DirectoryAction::SendAttach { uri } => {
                    actions.push(self.send_console(ConsoleRequest::attach(&uri)));
                    actions.push(self.schedule(TimerKind::AttachProbe, self.config.attach_settle));
                },
                DirectoryAction::ProbeInfo => match self.gate.issue(PendingKind::Info) {
                    Ok(token) => {
                        actions.push(self.send_console(ConsoleRequest::info()));
                        actions.push(self.schedule(
                            TimerKind::ProbeTimeout { token },
                            self.config.probe_timeout,
                        ));
                    },
                    Err(error) => {
                        tracing::warn!(%error, "gate busy at attach probe; attach failed");
                        let failed = self.directory.on_info_result(false);
                        actions.extend(self.apply_directory_actions(failed));
                    },
                },
                DirectoryAction::Confirmed { uri } => {
                    actions.push(BridgeAction::Status(StatusUpdate::Attached { uri }));
                    // The one cross-connection coupling outside the
                    // handshake: a confirmed device plus a known server
                    // target reopens the server session.
                    if let Some(address) = self.server_address.clone() {
                        if !self.server_open {
                            actions.push(BridgeAction::ConnectServer { address });
                        }
                    }
                },
                DirectoryAction::AttachFailed { uri } => {
                    actions.push(BridgeAction::Status(StatusUpdate::AttachFailed { uri }));
                },
            }
        }
        actions
    }

    fn apply_handshake_actions(
        &mut self,
        handshake_actions: Vec<HandshakeAction>,
    ) -> Vec<BridgeAction> {
        let mut actions = Vec::new();
        for handshake_action in handshake_actions {
            match handshake_action {
                HandshakeAction::ReadFingerprint => {
                    let attached = self.is_attached();
                    let read = self.memory.read(
                        &mut self.gate,
                        attached,
                        self.config.fingerprint_offset,
                        self.config.fingerprint_len,
                        ReadPurpose::Fingerprint,
                    );
                    match read {
                        Ok(frame) => actions.push(self.send_console(frame)),
                        Err(error) => {
                            tracing::warn!(%error, "fingerprint read could not start");
                            self.handshake.on_read_failed();
                        },
                    }
                },
                HandshakeAction::SendConnect(command) => {
                    actions.push(BridgeAction::SendServer { commands: vec![command] });
                    actions.push(BridgeAction::Status(StatusUpdate::Auth(self.handshake.state())));
                },
            }
        }
        actions
    }

    fn send_console(&self, frame: ConsoleRequest) -> BridgeAction {
        BridgeAction::SendConsole { generation: self.generation, frame }
    }

    fn schedule(&self, kind: TimerKind, after: Duration) -> BridgeAction {
        BridgeAction::Schedule { timer: Timer { generation: self.generation, kind }, after }
    }
}

/// Append the default port when the address names none.
///
/// Accepts `host` or `host:port`; anything after the last `:` that parses as
/// a port is kept as-is.
pub fn normalize_server_address(address: &str, default_port: u16) -> String {
    let trimmed = address.trim();
    if let Some((_, tail)) = trimmed.rsplit_once(':') {
        if tail.parse::<u16>().is_ok() {
            return trimmed.to_owned();
        }
    }
    format!("{trimmed}:{default_port}")
}
