//! Bifrost bridge runtime.
//!
//! Production runtime around the sans-IO bridge in `bifrost-core`:
//!
//! ```text
//! bifrost-bridge
//!   ├─ SystemEnv      (production Environment impl)
//!   ├─ WsSession      (WebSocket session tasks via tokio-tungstenite)
//!   └─ BridgeDriver   (event fan-in and action execution)
//! ```
//!
//! The driver merges session events, timers and caller commands into one
//! channel and feeds them to the state machine; the actions it gets back are
//! the only thing that touches a socket.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod system_env;
mod transport;

pub use driver::{BridgeDriver, DriverOptions};
pub use error::RuntimeError;
pub use system_env::SystemEnv;
pub use transport::{OutFrame, SessionEvent, WsSession};
