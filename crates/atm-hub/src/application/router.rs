//! CommandRouter: dispatches decoded requests to their backend endpoints.
//!
//! Each of the five request kinds has exactly one [`CommandHandler`] in the
//! [`HandlerTable`].  The table is built once at start-up and never changes,
//! so routing needs no locking.  Anything that is not a request (unknown
//! tags, responses echoed back by a terminal) is discarded with a log line.

use std::sync::Arc;

use async_trait::async_trait;
use atm_core::protocol::messages::{
    AtmMessage, CommandKind, DepositRequest, InquiryRequest, ValidateCardRequest,
    ValidatePinRequest, WithdrawRequest,
};
use thiserror::Error;
use tracing::{debug, info};

/// Errors a backend endpoint may report for one request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The endpoint received the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The endpoint could not accept the request at all.
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),
}

/// A backend endpoint for one request payload type.
#[async_trait]
pub trait CommandHandler<P: Send + 'static>: Send + Sync {
    async fn handle(&self, payload: P) -> Result<(), HandlerError>;
}

/// The fixed mapping from request kind to endpoint.
#[derive(Clone)]
pub struct HandlerTable {
    pub validate_card: Arc<dyn CommandHandler<ValidateCardRequest>>,
    pub validate_pin: Arc<dyn CommandHandler<ValidatePinRequest>>,
    pub deposit: Arc<dyn CommandHandler<DepositRequest>>,
    pub withdraw: Arc<dyn CommandHandler<WithdrawRequest>>,
    pub inquiry: Arc<dyn CommandHandler<InquiryRequest>>,
}

/// What the router did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The message was handed to the endpoint for this kind.
    Dispatched(CommandKind),
    /// The message was not a routable request and was dropped.
    Discarded,
}

pub struct CommandRouter {
    handlers: HandlerTable,
}

impl CommandRouter {
    pub fn new(handlers: HandlerTable) -> Self {
        Self { handlers }
    }

    /// Hands `msg` to the endpoint registered for its kind.
    ///
    /// Exactly one endpoint is invoked for a request; none is invoked for
    /// anything else.
    ///
    /// # Errors
    ///
    /// Propagates the endpoint's [`HandlerError`] unchanged.
    pub async fn route(&self, msg: AtmMessage) -> Result<RouteOutcome, HandlerError> {
        let kind = msg.command_kind();
        match msg {
            AtmMessage::ValidateCardRequest(req) => self.handlers.validate_card.handle(req).await?,
            AtmMessage::ValidatePinRequest(req) => self.handlers.validate_pin.handle(req).await?,
            AtmMessage::DepositRequest(req) => self.handlers.deposit.handle(req).await?,
            AtmMessage::WithdrawRequest(req) => self.handlers.withdraw.handle(req).await?,
            AtmMessage::InquiryRequest(req) => self.handlers.inquiry.handle(req).await?,
            AtmMessage::Unknown { event, .. } => {
                info!("discarding message with unknown event tag 0x{event:02X}");
                return Ok(RouteOutcome::Discarded);
            }
            other @ (AtmMessage::ValidateCardResponse(_)
            | AtmMessage::ValidatePinResponse(_)
            | AtmMessage::DepositResponse(_)
            | AtmMessage::WithdrawResponse(_)
            | AtmMessage::InquiryResponse(_)
            | AtmMessage::Error(_)) => {
                info!(
                    "discarding hub-originated event 0x{:02X} received from a terminal",
                    other.event_tag()
                );
                return Ok(RouteOutcome::Discarded);
            }
        }
        debug!("dispatched {kind}");
        Ok(RouteOutcome::Dispatched(kind))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
