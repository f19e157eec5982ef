//! Live session with the tutor service
//!
//! This module keeps the client connected to the tutor over a WebSocket and
//! falls back to the offline simulator when it can't. It is structured into
//! submodules:
//!
//! - `machine`: Pure connection state machine (states, signals, effects).
//! - `backoff`: Reconnect delay policy.
//! - `transport`: The `Transport` seam and its `tokio-tungstenite` implementation.
//! - `connection`: Executes machine effects: timers, heartbeat, dual-mode send.
//! - `session`: The event loop routing commands and replies to the UI.

pub mod backoff;
pub mod connection;
pub mod machine;
pub mod session;
pub mod transport;

pub use connection::{ConnectionManager, ManagerChannels};
pub use machine::ConnectionState;
pub use session::{Caller, Command, Session, UiEvent};
pub use transport::WsTransport;
