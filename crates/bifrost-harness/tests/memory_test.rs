//! Integration tests for memory reads and two-phase writes.

#![allow(clippy::unwrap_used)]

use bifrost_core::{BridgeError, BridgeEvent};
use bifrost_harness::SimWorld;

/// Helper: world with an attached device.
fn attached_world(seed: u64) -> SimWorld {
    let mut world = SimWorld::new(seed);
    world.console.devices = vec!["SD2SNES COM3".to_owned()];
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    world.fire_next_timer().unwrap();
    assert!(world.bridge.is_attached());
    // Retire the already-satisfied probe deadline so the next timer these
    // tests fire is their own.
    world.fire_next_timer().unwrap();
    assert_eq!(world.pending_timers(), 0);
    world
}

#[test]
fn read_delivers_bytes_at_the_requested_offset() {
    let mut world = attached_world(20);
    world.console.memory.insert(0x7E_0010, vec![0xAB, 0xCD]);

    world.process(BridgeEvent::ReadRequested { offset: 0x7E_0010, len: 2 }).unwrap();

    assert_eq!(world.delivered, vec![(0x7E_0010, vec![0xAB, 0xCD])]);
}

#[test]
fn read_requires_an_attachment() {
    let mut world = SimWorld::new(21);
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();

    let err = world.process(BridgeEvent::ReadRequested { offset: 0, len: 1 }).unwrap_err();
    assert!(matches!(err, BridgeError::NotAttached));
}

#[test]
fn write_sends_command_then_exactly_one_payload() {
    let mut world = attached_world(22);

    world
        .process(BridgeEvent::WriteRequested { offset: 0x7E_0010, len: 2, data: vec![1, 2] })
        .unwrap();

    // Command frame is out immediately; the payload waits for the settle
    // delay.
    assert_eq!(world.console.put_commands, vec![(0x7E_0010, 2)]);
    assert!(world.console.payloads.is_empty());

    world.fire_next_timer().unwrap();
    assert_eq!(world.console.payloads, vec![vec![1, 2]]);

    // No further payloads.
    world.fire_next_timer().unwrap();
    assert_eq!(world.console.payloads.len(), 1);
}

#[test]
fn write_payload_is_dropped_when_the_session_was_replaced() {
    let mut world = attached_world(23);

    world
        .process(BridgeEvent::WriteRequested { offset: 0x7E_0010, len: 2, data: vec![1, 2] })
        .unwrap();

    // The session is replaced before the settle delay elapses; the payload
    // must never reach the new session.
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    while world.pending_timers() > 0 {
        world.fire_next_timer().unwrap();
    }

    assert!(world.console.payloads.is_empty());
}

#[test]
fn overlapping_reads_are_refused_not_queued() {
    let mut world = attached_world(24);

    // Hold the reply back so the first read stays in flight.
    world.console.memory.insert(0x10, vec![0x01]);
    let generation = world.generation();

    // Issue the read against a model that answers inline, then simulate an
    // in-flight request by issuing through the bridge directly: the second
    // read must fail while the first is pending. The scripted daemon answers
    // synchronously, so drive the bridge without the world loop here.
    let frame_actions = world
        .bridge
        .handle(BridgeEvent::ReadRequested { offset: 0x10, len: 1 })
        .unwrap();
    assert!(!frame_actions.is_empty());

    let err =
        world.bridge.handle(BridgeEvent::ReadRequested { offset: 0x20, len: 1 }).unwrap_err();
    assert!(matches!(err, BridgeError::ProtocolBusy { .. }));

    // Resolving the first read frees the slot.
    world
        .process(BridgeEvent::ConsoleMessage {
            generation,
            payload: bifrost_core::ConsolePayload::Binary(vec![0x01]),
        })
        .unwrap();
    world.process(BridgeEvent::ReadRequested { offset: 0x20, len: 1 }).unwrap();
    assert_eq!(world.delivered, vec![(0x10, vec![0x01]), (0x20, vec![0x00])]);
}

#[test]
fn writes_do_not_block_reads() {
    let mut world = attached_world(25);
    world.console.memory.insert(0x30, vec![0x42]);

    world
        .process(BridgeEvent::WriteRequested { offset: 0x7E_0010, len: 1, data: vec![9] })
        .unwrap();

    // A write in its settle window does not occupy the request slot.
    world.process(BridgeEvent::ReadRequested { offset: 0x30, len: 1 }).unwrap();
    assert_eq!(world.delivered, vec![(0x30, vec![0x42])]);

    world.fire_next_timer().unwrap();
    assert_eq!(world.console.payloads, vec![vec![9]]);
}
