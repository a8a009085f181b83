//! LifecycleController: the four connection callbacks the transport drives.
//!
//! ```text
//! on_connect ──► registry.add
//! on_message ──► codec.decode ──► router.route
//! on_close   ──► registry.remove
//! on_error   ──► registry.remove
//! ```
//!
//! The controller owns no per-connection state beyond registry membership.
//! The transport guarantees exactly one of `on_close` / `on_error` per
//! connection; both are idempotent regardless.

use std::fmt::Display;
use std::sync::Arc;

use atm_core::protocol::{Codec, DecodeError};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::publisher::BroadcastPublisher;
use crate::application::registry::{ConnectionHandle, ConnectionRegistry};
use crate::application::router::{CommandRouter, HandlerError, RouteOutcome};
use crate::domain::{CloseStatus, SessionId};

/// Why one inbound message was not processed.
///
/// None of these terminate the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message arrived for a session that is not registered.
    #[error("session {0} is not open")]
    SessionNotOpen(SessionId),

    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),

    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

pub struct LifecycleController {
    registry: Arc<ConnectionRegistry>,
    router: CommandRouter,
    codec: Arc<dyn Codec>,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: CommandRouter,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            registry,
            router,
            codec,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// A publisher over the same registry and codec this controller uses.
    pub fn publisher(&self) -> BroadcastPublisher {
        BroadcastPublisher::new(Arc::clone(&self.registry), Arc::clone(&self.codec))
    }

    /// Registers a freshly opened connection.
    pub fn on_connect(&self, handle: Arc<dyn ConnectionHandle>) {
        let id = handle.id().clone();
        if self.registry.add(handle) {
            info!("Session ID : {id} - Connection opened");
        } else {
            warn!("Session ID : {id} - already registered; duplicate open ignored");
        }
    }

    /// Decodes one binary frame and routes it.
    ///
    /// # Errors
    ///
    /// - [`MessageError::SessionNotOpen`] if `id` is not registered.
    /// - [`MessageError::Decode`] if the frame is malformed.  No handler is
    ///   invoked.
    /// - [`MessageError::Handler`] if the endpoint failed.
    pub async fn on_message(
        &self,
        id: &SessionId,
        bytes: &[u8],
    ) -> Result<RouteOutcome, MessageError> {
        if !self.registry.contains(id) {
            return Err(MessageError::SessionNotOpen(id.clone()));
        }
        let msg = self.codec.decode(bytes)?;
        info!(
            "Session ID : {id} - {} command received: {}",
            msg.command_kind(),
            msg.summary()
        );
        Ok(self.router.route(msg).await?)
    }

    /// Deregisters a connection that closed with `status`.
    pub fn on_close(&self, id: &SessionId, status: &CloseStatus) {
        self.registry.remove(id);
        info!(
            "Session ID : {id} - Connection closed with status code {} and reason {}",
            status.code, status.reason
        );
    }

    /// Deregisters a connection that failed with `err`.
    pub fn on_error(&self, id: &SessionId, err: impl Display) {
        self.registry.remove(id);
        warn!("Session ID : {id} - Connection error: {err}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
