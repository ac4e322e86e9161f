//! Scripted world model for bridge simulation.
//!
//! [`SimWorld`] closes the loop that the production driver closes with real
//! sockets: it feeds events to the bridge, executes the returned actions
//! against scripted console and server models, and feeds the models' replies
//! straight back in. Timers are captured in scheduling order and fired
//! explicitly, so a whole discovery/attach/handshake exchange runs as one
//! deterministic, synchronous call chain.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bifrost_core::{
    Bridge, BridgeAction, BridgeConfig, BridgeError, BridgeEvent, ConsolePayload, Generation,
    StatusUpdate, Timer,
};
use bifrost_proto::{ClientCommand, ConsoleRequest, Opcode};

use crate::sim_env::SimEnv;

/// Scripted console daemon.
pub struct ConsoleModel {
    /// Whether connection attempts succeed.
    pub reachable: bool,
    /// Device URIs returned to enumeration requests.
    pub devices: Vec<String>,
    /// Reply to the `Info` probe; unparsable text makes the probe fail.
    pub info_reply: String,
    /// Swallow `Info` probes entirely, leaving them unanswered.
    pub drop_info_replies: bool,
    /// Memory regions keyed by offset, served to `GetAddress`.
    pub memory: HashMap<u32, Vec<u8>>,
    /// URI of the device the daemon currently considers attached.
    pub attached: Option<String>,
    /// Raw payload frames received (the second phase of writes).
    pub payloads: Vec<Vec<u8>>,
    /// `PutAddress` commands received, as (offset, len).
    pub put_commands: Vec<(u32, u32)>,
}

impl Default for ConsoleModel {
    fn default() -> Self {
        Self {
            reachable: true,
            devices: Vec::new(),
            info_reply: r#"{"Results":["1.0.0","firmware"]}"#.to_owned(),
            drop_info_replies: false,
            memory: HashMap::new(),
            attached: None,
            payloads: Vec::new(),
            put_commands: Vec::new(),
        }
    }
}

impl ConsoleModel {
    fn respond(&mut self, frame: &ConsoleRequest) -> Option<ConsolePayload> {
        match frame.opcode {
            Opcode::DeviceList => {
                let results: Vec<serde_json::Value> =
                    self.devices.iter().map(|d| serde_json::Value::from(d.as_str())).collect();
                let body = serde_json::json!({ "Results": results });
                Some(ConsolePayload::Text(body.to_string()))
            },
            Opcode::Attach => {
                self.attached = frame.operands.first().cloned();
                None
            },
            Opcode::Info => {
                if self.drop_info_replies {
                    None
                } else {
                    Some(ConsolePayload::Text(self.info_reply.clone()))
                }
            },
            Opcode::GetAddress => {
                let offset = parse_hex(frame.operands.first());
                let len = usize::try_from(parse_hex(frame.operands.get(1))).unwrap_or(0);
                let data = self
                    .memory
                    .get(&offset)
                    .cloned()
                    .unwrap_or_else(|| vec![0; len]);
                Some(ConsolePayload::Binary(data))
            },
            Opcode::PutAddress => {
                let offset = parse_hex(frame.operands.first());
                let len = parse_hex(frame.operands.get(1));
                self.put_commands.push((offset, len));
                None
            },
        }
    }
}

fn parse_hex(operand: Option<&String>) -> u32 {
    operand.and_then(|o| u32::from_str_radix(o, 16).ok()).unwrap_or(0)
}

/// Scripted multiworld server.
#[derive(Default)]
pub struct ServerModel {
    /// Whether connection attempts succeed.
    pub reachable: bool,
    /// Reply to `Connect` with `Connected` automatically.
    pub auto_accept: bool,
    /// Address the bridge last connected to.
    pub last_address: Option<String>,
    /// Command batches received from the bridge.
    pub received: Vec<Vec<ClientCommand>>,
}

/// One bridge plus scripted peers, wired together.
pub struct SimWorld {
    /// The simulated environment shared with the bridge.
    pub env: SimEnv,
    /// The bridge under test.
    pub bridge: Bridge<SimEnv>,
    /// The console daemon model.
    pub console: ConsoleModel,
    /// The server model.
    pub server: ServerModel,
    /// Status updates emitted by the bridge, in order.
    pub statuses: Vec<StatusUpdate>,
    /// Resolved caller reads, as (offset, bytes).
    pub delivered: Vec<(u32, Vec<u8>)>,
    timers: VecDeque<(Timer, Duration)>,
}

impl SimWorld {
    /// Create a world with a seeded environment and default config.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let env = SimEnv::new(seed);
        Self {
            bridge: Bridge::new(env.clone(), BridgeConfig::default()),
            env,
            console: ConsoleModel::default(),
            server: ServerModel::default(),
            statuses: Vec::new(),
            delivered: Vec::new(),
            timers: VecDeque::new(),
        }
    }

    /// Feed an event and execute everything it causes, transitively.
    ///
    /// # Errors
    ///
    /// Propagates `BridgeError` from the bridge.
    pub fn process(&mut self, event: BridgeEvent) -> Result<(), BridgeError> {
        let actions = self.bridge.handle(event)?;
        for action in actions {
            self.execute(action)?;
        }
        Ok(())
    }

    /// Fire the oldest scheduled timer, advancing simulated time by its
    /// delay first.
    ///
    /// # Errors
    ///
    /// Propagates `BridgeError` from the bridge.
    pub fn fire_next_timer(&mut self) -> Result<(), BridgeError> {
        let Some((timer, after)) = self.timers.pop_front() else {
            return Ok(());
        };
        self.env.advance(after);
        self.process(BridgeEvent::TimerFired(timer))
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Inject a raw text message from the server.
    ///
    /// # Errors
    ///
    /// Propagates `BridgeError` from the bridge.
    pub fn server_sends(&mut self, text: &str) -> Result<(), BridgeError> {
        self.process(BridgeEvent::ServerMessage { text: text.to_owned() })
    }

    fn execute(&mut self, action: BridgeAction) -> Result<(), BridgeError> {
        match action {
            BridgeAction::ConnectConsole { generation } => {
                if self.console.reachable {
                    self.process(BridgeEvent::ConsoleOpen { generation })?;
                } else {
                    self.process(BridgeEvent::ConsoleError {
                        generation,
                        detail: "connection refused".to_owned(),
                    })?;
                    self.process(BridgeEvent::ConsoleClosed { generation, clean: false })?;
                }
            },

            BridgeAction::CloseConsole { generation } => {
                self.console.attached = None;
                self.process(BridgeEvent::ConsoleClosed { generation, clean: true })?;
            },

            BridgeAction::SendConsole { generation, frame } => {
                if let Some(payload) = self.console.respond(&frame) {
                    self.process(BridgeEvent::ConsoleMessage { generation, payload })?;
                }
            },

            BridgeAction::SendConsoleRaw { data, .. } => {
                self.console.payloads.push(data);
            },

            BridgeAction::ConnectServer { address } => {
                self.server.last_address = Some(address);
                if self.server.reachable {
                    self.process(BridgeEvent::ServerOpen)?;
                } else {
                    self.process(BridgeEvent::ServerError {
                        detail: "connection refused".to_owned(),
                    })?;
                    self.process(BridgeEvent::ServerClosed { clean: false })?;
                }
            },

            BridgeAction::SendServer { commands } => {
                let authenticating =
                    commands.iter().any(|c| matches!(c, ClientCommand::Connect { .. }));
                self.server.received.push(commands);
                if authenticating && self.server.auto_accept {
                    self.server_sends(r#"[{"cmd":"Connected"}]"#)?;
                }
            },

            BridgeAction::Schedule { timer, after } => {
                self.timers.push_back((timer, after));
            },

            BridgeAction::DeliverMemory { offset, data } => {
                self.delivered.push((offset, data));
            },

            BridgeAction::Status(update) => {
                self.statuses.push(update);
            },
        }
        Ok(())
    }

    /// Current console generation, for crafting stale events in tests.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.bridge.console_generation()
    }
}
