//! Domain layer for atm-hub.
//!
//! Plain types with no I/O, no async runtime and no framework dependencies:
//! session identity, close status and the runtime configuration.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod session;

pub use config::HubConfig;
pub use session::{CloseStatus, SessionId, SessionState};
