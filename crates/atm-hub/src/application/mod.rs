//! Application layer for atm-hub.
//!
//! Connection-agnostic orchestration: who is connected, where each request
//! goes, and how hub messages fan out.  Nothing here knows about sockets or
//! WebSocket frames; the transport reaches this layer only through
//! [`LifecycleController`] and the [`ConnectionHandle`] trait.

pub mod lifecycle;
pub mod publisher;
pub mod registry;
pub mod router;

pub use lifecycle::{LifecycleController, MessageError};
pub use publisher::{BroadcastPublisher, PublishReport};
pub use registry::{ConnectionHandle, ConnectionRegistry, Frame, SendError};
pub use router::{CommandHandler, CommandRouter, HandlerError, HandlerTable, RouteOutcome};
