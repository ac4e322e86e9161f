//! Integration tests for device discovery and attachment.
//!
//! These tests run the bridge against a scripted console daemon and verify:
//! - Polling while no device is enumerated
//! - Sole-device auto-attachment and the two-step attach protocol
//! - Explicit selection surviving re-polls and reconnects
//! - Probe failure leaving the bridge detached

#![allow(clippy::unwrap_used)]

use bifrost_core::{BridgeError, BridgeEvent, DeviceSelector, StatusUpdate};
use bifrost_harness::SimWorld;

#[test]
fn empty_enumeration_polls_until_a_device_appears() {
    let mut world = SimWorld::new(1);
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();

    // No devices: each enumeration schedules one re-poll.
    assert_eq!(world.pending_timers(), 1);
    world.fire_next_timer().unwrap();
    assert_eq!(world.pending_timers(), 1);

    // Device appears; the next poll finds it and attaches.
    world.console.devices = vec!["SD2SNES COM3".to_owned()];
    world.fire_next_timer().unwrap(); // poll -> enumerate -> attach scheduled
    world.fire_next_timer().unwrap(); // probe
    assert!(world.bridge.is_attached());
}

#[test]
fn sole_device_attaches_through_probe() {
    let mut world = SimWorld::new(2);
    world.console.devices = vec!["SD2SNES COM3".to_owned()];

    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    // The Attach frame went out, but attachment is unconfirmed until the
    // probe answers.
    assert!(!world.bridge.is_attached());
    assert_eq!(world.console.attached.as_deref(), Some("SD2SNES COM3"));

    world.fire_next_timer().unwrap();
    assert!(world.bridge.is_attached());
    assert!(world
        .statuses
        .iter()
        .any(|s| matches!(s, StatusUpdate::Attached { uri } if uri == "SD2SNES COM3")));
}

#[test]
fn multiple_devices_wait_for_explicit_selection() {
    let mut world = SimWorld::new(3);
    world.console.devices = vec!["SD2SNES COM3".to_owned(), "RetroArch".to_owned()];

    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    assert!(!world.bridge.is_attached());
    assert_eq!(world.bridge.devices().len(), 2);

    let token = world.bridge.devices()[1].token;
    world.process(BridgeEvent::AttachRequested { selector: DeviceSelector::Token(token) }).unwrap();
    world.fire_next_timer().unwrap();

    assert!(world.bridge.is_attached());
    assert_eq!(world.console.attached.as_deref(), Some("RetroArch"));
}

#[test]
fn failed_probe_reports_attach_failure() {
    let mut world = SimWorld::new(4);
    world.console.devices = vec!["SD2SNES COM3".to_owned()];
    world.console.info_reply = "not json".to_owned();

    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    world.fire_next_timer().unwrap();

    assert!(!world.bridge.is_attached());
    assert!(world
        .statuses
        .iter()
        .any(|s| matches!(s, StatusUpdate::AttachFailed { uri } if uri == "SD2SNES COM3")));
}

#[test]
fn unanswered_probe_times_out_and_frees_the_request_slot() {
    let mut world = SimWorld::new(8);
    world.console.devices = vec!["SD2SNES COM3".to_owned()];
    world.console.drop_info_replies = true;

    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    world.fire_next_timer().unwrap(); // settle: the probe goes out, unanswered
    assert!(!world.bridge.is_attached());
    assert_eq!(world.pending_timers(), 1);

    world.fire_next_timer().unwrap(); // probe deadline
    assert!(!world.bridge.is_attached());
    assert!(world
        .statuses
        .iter()
        .any(|s| matches!(s, StatusUpdate::AttachFailed { uri } if uri == "SD2SNES COM3")));

    // The timeout freed the request slot: a fresh selection from the same
    // enumeration attaches once the daemon answers again.
    world.console.drop_info_replies = false;
    let token = world.bridge.devices()[0].token;
    world.process(BridgeEvent::AttachRequested { selector: DeviceSelector::Token(token) }).unwrap();
    world.fire_next_timer().unwrap();
    assert!(world.bridge.is_attached());
}

#[test]
fn token_from_a_superseded_enumeration_is_rejected() {
    let mut world = SimWorld::new(5);
    world.console.devices = vec!["SD2SNES COM3".to_owned(), "RetroArch".to_owned()];
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    let token = world.bridge.devices()[0].token;

    // The session drops and comes back; the old enumeration is dead.
    let generation = world.generation();
    world.process(BridgeEvent::ConsoleClosed { generation, clean: false }).unwrap();

    let err = world
        .process(BridgeEvent::AttachRequested { selector: DeviceSelector::Token(token) })
        .unwrap_err();
    assert!(matches!(err, BridgeError::StaleDevice { .. }));
}

#[test]
fn uri_request_reconnects_and_resumes() {
    let mut world = SimWorld::new(6);
    world.console.devices = vec!["SD2SNES COM3".to_owned(), "RetroArch".to_owned()];

    // No session yet: a URI request opens one and attaches once the URI is
    // enumerated.
    world
        .process(BridgeEvent::AttachRequested {
            selector: DeviceSelector::Uri("RetroArch".to_owned()),
        })
        .unwrap();
    world.fire_next_timer().unwrap();

    assert!(world.bridge.is_attached());
    assert_eq!(world.console.attached.as_deref(), Some("RetroArch"));
}

#[test]
fn attach_after_detach_needs_a_fresh_enumeration() {
    let mut world = SimWorld::new(9);
    world.console.devices = vec!["SD2SNES COM3".to_owned(), "RetroArch".to_owned()];
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    let token = world.bridge.devices()[1].token;
    world.process(BridgeEvent::AttachRequested { selector: DeviceSelector::Token(token) }).unwrap();
    world.fire_next_timer().unwrap();
    assert!(world.bridge.is_attached());

    // Detach closes the console session; the reported closure kills the
    // enumeration, so the old token must not quietly re-attach.
    world.process(BridgeEvent::DetachRequested).unwrap();
    assert!(!world.bridge.is_attached());

    let err = world
        .process(BridgeEvent::AttachRequested { selector: DeviceSelector::Token(token) })
        .unwrap_err();
    assert!(matches!(err, BridgeError::StaleDevice { .. }));
}

#[test]
fn detach_clears_attachment_and_closes_the_session() {
    let mut world = SimWorld::new(7);
    world.console.devices = vec!["SD2SNES COM3".to_owned()];
    world.process(BridgeEvent::ConsoleConnectRequested).unwrap();
    world.fire_next_timer().unwrap();
    assert!(world.bridge.is_attached());

    world.process(BridgeEvent::DetachRequested).unwrap();
    assert!(!world.bridge.is_attached());
    assert!(world.statuses.iter().any(|s| matches!(s, StatusUpdate::Detached)));
}
