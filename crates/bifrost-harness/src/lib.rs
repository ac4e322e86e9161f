//! Deterministic simulation harness for bridge testing.
//!
//! Seeded-environment and scripted-peer implementations for reproducible
//! end-to-end testing of the bridge state machine: a console daemon model
//! that answers enumeration, attach, probe and memory traffic, and a server
//! model that records command batches and optionally accepts authentication.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_env;
pub mod world;

pub use sim_env::SimEnv;
pub use world::{ConsoleModel, ServerModel, SimWorld};
