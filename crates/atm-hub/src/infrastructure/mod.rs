//! Infrastructure layer for atm-hub.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from terminals, queueing requests toward the business backend and reading
//! the configuration file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for terminal WebSocket connections
//! - Performing the WebSocket HTTP upgrade handshake
//! - Spawning per-session Tokio tasks and their outbound writers
//! - Bounded queues between the router and the backend
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Routing and fan-out rules (that is the application layer)
//! - Session identity and configuration types (that is the domain layer)

pub mod config_file;
pub mod endpoints;
pub mod ws_server;

pub use config_file::{load_config_file, parse_config, ConfigError, HubFileConfig};
pub use endpoints::{forward_responses, queue_endpoints, EndpointReceivers, QueueEndpoint};
pub use ws_server::{bind, run_server, serve, WsConnectionHandle};
