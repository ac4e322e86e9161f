//! Async orchestrator around the bridge state machine.
//!
//! `BridgeDriver` fans every input source into one event channel — console
//! session tasks, the server session task, timers and caller commands — and
//! processes them strictly one at a time through [`Bridge::handle`],
//! executing the returned actions. The bridge itself never blocks and never
//! touches a socket.

use bifrost_core::{
    AuthState, Bridge, BridgeAction, BridgeConfig, BridgeEvent, ConsolePayload, DeviceSelector,
    Environment, Generation, StatusUpdate,
};
use tokio::sync::mpsc;

use crate::{
    error::RuntimeError,
    system_env::SystemEnv,
    transport::{OutFrame, SessionEvent, WsSession},
};

/// Runtime options for the driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// WebSocket URL of the console daemon.
    pub console_url: String,
    /// Multiworld server address (`host` or `host:port`), if configured.
    pub server_address: Option<String>,
    /// Device URI to attach to; a sole enumerated device auto-attaches.
    pub device_uri: Option<String>,
    /// Room password, if the server requires one.
    pub password: Option<String>,
}

struct ConsoleHandle {
    generation: Generation,
    session: WsSession,
}

/// Owns the bridge, its sessions and the merged event loop.
pub struct BridgeDriver {
    bridge: Bridge<SystemEnv>,
    env: SystemEnv,
    options: DriverOptions,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    events_rx: mpsc::UnboundedReceiver<BridgeEvent>,
    console: Option<ConsoleHandle>,
    server: Option<WsSession>,
}

impl BridgeDriver {
    /// Create a driver around a fresh bridge.
    #[must_use]
    pub fn new(config: BridgeConfig, options: DriverOptions) -> Self {
        let env = SystemEnv::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            bridge: Bridge::new(env.clone(), config),
            env,
            options,
            events_tx,
            events_rx,
            console: None,
            server: None,
        }
    }

    /// Sender for injecting caller events (reads, writes, attach requests).
    #[must_use]
    pub fn events(&self) -> mpsc::UnboundedSender<BridgeEvent> {
        self.events_tx.clone()
    }

    /// Run the event loop until a fatal error or until every event source is
    /// gone.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` when the bridge surfaces a fatal error.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        // Seed the initial intents from configuration. A device request with
        // no console session open triggers the connection itself.
        if let Some(uri) = self.options.device_uri.clone() {
            self.dispatch(BridgeEvent::AttachRequested { selector: DeviceSelector::Uri(uri) })?;
        } else {
            self.dispatch(BridgeEvent::ConsoleConnectRequested)?;
        }

        if let Some(address) = self.options.server_address.clone() {
            self.dispatch(BridgeEvent::ServerConnectRequested {
                address,
                password: self.options.password.clone(),
            })?;
        }

        while let Some(event) = self.events_rx.recv().await {
            self.dispatch(event)?;
        }

        Ok(())
    }

    fn dispatch(&mut self, event: BridgeEvent) -> Result<(), RuntimeError> {
        match self.bridge.handle(event) {
            Ok(actions) => {
                for action in actions {
                    self.execute(action)?;
                }
                Ok(())
            },
            Err(error) if error.is_fatal() => Err(error.into()),
            Err(error) => {
                tracing::warn!(%error, "bridge rejected event");
                Ok(())
            },
        }
    }

    fn execute(&mut self, action: BridgeAction) -> Result<(), RuntimeError> {
        match action {
            BridgeAction::ConnectConsole { generation } => {
                // Dropping the old handle aborts its task; its events are
                // stamped with a superseded generation either way.
                let (session, events) = WsSession::open(self.options.console_url.clone());
                self.console = Some(ConsoleHandle { generation, session });
                self.spawn_console_forwarder(generation, events);
            },

            BridgeAction::CloseConsole { generation } => {
                if self.console.as_ref().is_some_and(|c| c.generation == generation) {
                    self.console = None;
                }
                // Dropping the handle aborts the session task before it can
                // emit its own Closed event, so report the closure here; the
                // bridge ignores it if the generation was already superseded.
                let _ = self
                    .events_tx
                    .send(BridgeEvent::ConsoleClosed { generation, clean: true });
            },

            BridgeAction::SendConsole { generation, frame } => {
                let text = frame.encode().map_err(bifrost_core::BridgeError::from)?;
                self.send_console(generation, OutFrame::Text(text));
            },

            BridgeAction::SendConsoleRaw { generation, data } => {
                self.send_console(generation, OutFrame::Binary(data));
            },

            BridgeAction::ConnectServer { address } => {
                let (session, events) = WsSession::open(format!("ws://{address}"));
                self.server = Some(session);
                self.spawn_server_forwarder(events);
            },

            BridgeAction::SendServer { commands } => {
                let text =
                    bifrost_proto::encode_batch(&commands).map_err(bifrost_core::BridgeError::from)?;
                match &self.server {
                    Some(session) => session.send(OutFrame::Text(text)),
                    None => tracing::debug!("server send with no session; dropping"),
                }
            },

            BridgeAction::Schedule { timer, after } => {
                let env = self.env.clone();
                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    env.sleep(after).await;
                    let _ = events_tx.send(BridgeEvent::TimerFired(timer));
                });
            },

            BridgeAction::DeliverMemory { offset, data } => {
                tracing::info!(offset = format_args!("{offset:X}"), len = data.len(), "read resolved");
            },

            BridgeAction::Status(update) => render_status(&update),
        }

        Ok(())
    }

    fn send_console(&self, generation: Generation, frame: OutFrame) {
        match &self.console {
            Some(handle) if handle.generation == generation => handle.session.send(frame),
            _ => tracing::debug!(generation, "console send for a superseded session; dropping"),
        }
    }

    fn spawn_console_forwarder(
        &self,
        generation: Generation,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mapped = match event {
                    SessionEvent::Open => BridgeEvent::ConsoleOpen { generation },
                    SessionEvent::Text(text) => BridgeEvent::ConsoleMessage {
                        generation,
                        payload: ConsolePayload::Text(text),
                    },
                    SessionEvent::Binary(data) => BridgeEvent::ConsoleMessage {
                        generation,
                        payload: ConsolePayload::Binary(data),
                    },
                    SessionEvent::Error(detail) => {
                        BridgeEvent::ConsoleError { generation, detail }
                    },
                    SessionEvent::Closed { clean } => {
                        let _ = events_tx.send(BridgeEvent::ConsoleClosed { generation, clean });
                        return;
                    },
                };
                if events_tx.send(mapped).is_err() {
                    return;
                }
            }
        });
    }

    fn spawn_server_forwarder(&self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let mapped = match event {
                    SessionEvent::Open => BridgeEvent::ServerOpen,
                    SessionEvent::Text(text) => BridgeEvent::ServerMessage { text },
                    SessionEvent::Binary(_) => {
                        tracing::debug!("binary frame from server; dropping");
                        continue;
                    },
                    SessionEvent::Error(detail) => BridgeEvent::ServerError { detail },
                    SessionEvent::Closed { clean } => {
                        let _ = events_tx.send(BridgeEvent::ServerClosed { clean });
                        return;
                    },
                };
                if events_tx.send(mapped).is_err() {
                    return;
                }
            }
        });
    }
}

fn render_status(update: &StatusUpdate) {
    match update {
        StatusUpdate::Devices(devices) => {
            let uris: Vec<&str> = devices.iter().map(|d| d.uri.as_str()).collect();
            tracing::info!(?uris, "devices enumerated");
        },
        StatusUpdate::Attached { uri } => tracing::info!(%uri, "device attached"),
        StatusUpdate::Detached => tracing::info!("device detached"),
        StatusUpdate::AttachFailed { uri } => tracing::warn!(%uri, "attach failed"),
        StatusUpdate::Room(info) => tracing::info!(
            hint_cost = info.hint_cost,
            forfeit_mode = %info.forfeit_mode,
            "room info received"
        ),
        StatusUpdate::Auth(state) => match state {
            AuthState::Authenticated => tracing::info!("authenticated with server"),
            other => tracing::info!(state = ?other, "authentication progress"),
        },
        StatusUpdate::ConsoleFault { detail } => tracing::warn!(%detail, "console fault"),
        StatusUpdate::ServerFault { detail } => tracing::warn!(%detail, "server fault"),
    }
}
