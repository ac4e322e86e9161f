//! Fuzz target for the bridge coordinator state machine
//!
//! Prevent protocol confusion on the correlation-free console channel.
//!
//! # Strategy
//!
//! - Event sequences: arbitrary interleavings of session lifecycle, inbound
//!   frames, caller requests and timer firings
//! - Stale stamping: events and timers carrying superseded generations
//! - Garbage frames: arbitrary text and binary payloads on both channels
//!
//! # Invariants
//!
//! - NEVER panic on any event sequence
//! - At most one reply-expecting console request in flight at a time
//! - `Authenticated` only reachable after a `Connect` command was sent
//! - Events stamped with a superseded generation produce no console sends

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use bifrost_core::{
    AuthState, Bridge, BridgeAction, BridgeConfig, BridgeEvent, ConsolePayload, DeviceSelector,
    Environment, Timer, TimerKind,
};
use bifrost_proto::ClientCommand;
use libfuzzer_sys::fuzz_target;

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31);
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    ConnectConsole,
    ConsoleOpen { stale: bool },
    TextFrame { stale: bool, text: String },
    BinaryFrame { stale: bool, data: Vec<u8> },
    ConsoleClosed { stale: bool, clean: bool },
    AttachByUri { uri: String },
    AttachByIndex { index: u8 },
    Detach,
    Read { offset: u32, len: u8 },
    Write { offset: u32, data: Vec<u8> },
    ConnectServer { address: String, password: Option<String> },
    ServerOpen,
    ServerText { text: String },
    ServerClosed { clean: bool },
    FirePoll { stale: bool },
    FireProbe { stale: bool },
    FireWrite { stale: bool, data: Vec<u8> },
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let mut bridge = Bridge::new(FuzzEnv, BridgeConfig::default());
    // External model of the gate: one reply-expecting request at a time.
    let mut in_flight = false;
    let mut console_open = false;
    let mut sent_connect = false;

    for event in events {
        let current = bridge.console_generation();
        // Saturating at generation 0 makes a "stale" stamp current again, so
        // the model below keys on the effective value, not the flag.
        let generation = |stale: bool| if stale { current.saturating_sub(1) } else { current };
        let is_current = |stale: bool| generation(stale) == current;

        let event = match event {
            FuzzEvent::ConnectConsole => BridgeEvent::ConsoleConnectRequested,
            FuzzEvent::ConsoleOpen { stale } => {
                if is_current(stale) {
                    console_open = true;
                }
                BridgeEvent::ConsoleOpen { generation: generation(stale) }
            },
            FuzzEvent::TextFrame { stale, text } => {
                if is_current(stale) && console_open {
                    in_flight = false;
                }
                BridgeEvent::ConsoleMessage {
                    generation: generation(stale),
                    payload: ConsolePayload::Text(text),
                }
            },
            FuzzEvent::BinaryFrame { stale, data } => {
                if is_current(stale) && console_open {
                    in_flight = false;
                }
                BridgeEvent::ConsoleMessage {
                    generation: generation(stale),
                    payload: ConsolePayload::Binary(data),
                }
            },
            FuzzEvent::ConsoleClosed { stale, clean } => {
                if is_current(stale) {
                    console_open = false;
                    in_flight = false;
                }
                BridgeEvent::ConsoleClosed { generation: generation(stale), clean }
            },
            FuzzEvent::AttachByUri { uri } => {
                BridgeEvent::AttachRequested { selector: DeviceSelector::Uri(uri) }
            },
            FuzzEvent::AttachByIndex { index } => {
                let devices = bridge.devices();
                let Some(device) = devices.get(index as usize % devices.len().max(1)) else {
                    continue;
                };
                BridgeEvent::AttachRequested { selector: DeviceSelector::Token(device.token) }
            },
            FuzzEvent::Detach => BridgeEvent::DetachRequested,
            FuzzEvent::Read { offset, len } => {
                BridgeEvent::ReadRequested { offset, len: u32::from(len) }
            },
            FuzzEvent::Write { offset, data } => {
                let len = data.len() as u32;
                BridgeEvent::WriteRequested { offset, len, data }
            },
            FuzzEvent::ConnectServer { address, password } => {
                BridgeEvent::ServerConnectRequested { address, password }
            },
            FuzzEvent::ServerOpen => BridgeEvent::ServerOpen,
            FuzzEvent::ServerText { text } => BridgeEvent::ServerMessage { text },
            FuzzEvent::ServerClosed { clean } => BridgeEvent::ServerClosed { clean },
            FuzzEvent::FirePoll { stale } => BridgeEvent::TimerFired(Timer {
                generation: generation(stale),
                kind: TimerKind::DevicePoll,
            }),
            FuzzEvent::FireProbe { stale } => BridgeEvent::TimerFired(Timer {
                generation: generation(stale),
                kind: TimerKind::AttachProbe,
            }),
            FuzzEvent::FireWrite { stale, data } => BridgeEvent::TimerFired(Timer {
                generation: generation(stale),
                kind: TimerKind::WritePayload { data },
            }),
        };

        let result = bridge.handle(event);

        // Any event that replaced the session (reconnects, device requests
        // while closed) empties the gate.
        if bridge.console_generation() != current {
            console_open = false;
            in_flight = false;
        }

        let Ok(actions) = result else {
            continue;
        };

        for action in actions {
            match action {
                BridgeAction::SendConsole { generation, frame } => {
                    assert_eq!(
                        generation,
                        bridge.console_generation(),
                        "console send stamped with a stale generation"
                    );
                    if frame.opcode.expects_reply() {
                        assert!(!in_flight, "second request issued while one was in flight");
                        in_flight = true;
                    }
                },
                BridgeAction::SendServer { commands } => {
                    if commands.iter().any(|c| matches!(c, ClientCommand::Connect { .. })) {
                        sent_connect = true;
                    }
                },
                _ => {},
            }
        }

        if bridge.auth_state() == AuthState::Authenticated {
            assert!(sent_connect, "authenticated without ever sending Connect");
        }
    }
});
