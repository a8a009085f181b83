//! atm-hub library crate.
//!
//! The real-time hub between ATM terminals and the bank's business
//! endpoints.  Terminals hold a WebSocket open to the hub, send binary
//! request envelopes over it and receive responses and broadcasts back.
//!
//! # Architecture
//!
//! ```text
//! ATM terminals (binary envelopes over WebSocket)
//!         ↕
//! [atm-hub]
//!   ├── domain/           Pure types: SessionId, CloseStatus, HubConfig
//!   ├── application/      Registry, router, publisher, lifecycle controller
//!   └── infrastructure/
//!         ├── ws_server/   WebSocket accept loop (tokio-tungstenite)
//!         ├── endpoints/   Bounded queues toward the business backend
//!         └── config_file/ Optional TOML configuration
//!         ↕
//! business backend (card, PIN, deposit, withdraw, inquiry)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async runtime.
//! - `application` depends on `domain` and `atm-core` only; it reaches the
//!   network through the [`application::ConnectionHandle`] trait.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.

/// Domain layer: session identity and configuration.
pub mod domain;

/// Application layer: connection registry, command routing and fan-out.
pub mod application;

/// Infrastructure layer: WebSocket server, endpoint queues, config file.
pub mod infrastructure;
