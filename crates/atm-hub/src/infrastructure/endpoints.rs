//! Queue-backed business endpoints.
//!
//! A [`QueueEndpoint`] is the hub side of a bounded channel to the business
//! backend.  The hub never blocks a terminal on a slow backend: when the
//! queue is full the request is rejected with [`HandlerError::Unavailable`].
//!
//! Messages travel the other way through [`forward_responses`], which
//! publishes whatever the backend sends to every connected terminal.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use atm_core::protocol::messages::{
    AtmMessage, DepositRequest, InquiryRequest, ValidateCardRequest, ValidatePinRequest,
    WithdrawRequest,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::application::{BroadcastPublisher, CommandHandler, HandlerError, HandlerTable};

/// Forwards each request of type `P` onto a bounded queue.
pub struct QueueEndpoint<P> {
    name: &'static str,
    tx: mpsc::Sender<P>,
}

impl<P> QueueEndpoint<P> {
    /// Creates an endpoint and the receiver the backend drains.
    pub fn channel(name: &'static str, capacity: NonZeroUsize) -> (Self, mpsc::Receiver<P>) {
        let (tx, rx) = mpsc::channel(capacity.get());
        (Self { name, tx }, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> fmt::Debug for QueueEndpoint<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEndpoint")
            .field("name", &self.name)
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

#[async_trait]
impl<P: Send + 'static> CommandHandler<P> for QueueEndpoint<P> {
    async fn handle(&self, payload: P) -> Result<(), HandlerError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => HandlerError::Unavailable(format!("{} queue is full", self.name)),
            TrySendError::Closed(_) => {
                HandlerError::Unavailable(format!("{} backend has shut down", self.name))
            }
        })
    }
}

/// The backend ends of the five endpoint queues.
pub struct EndpointReceivers {
    pub validate_card: mpsc::Receiver<ValidateCardRequest>,
    pub validate_pin: mpsc::Receiver<ValidatePinRequest>,
    pub deposit: mpsc::Receiver<DepositRequest>,
    pub withdraw: mpsc::Receiver<WithdrawRequest>,
    pub inquiry: mpsc::Receiver<InquiryRequest>,
}

/// Builds a [`HandlerTable`] of queue endpoints, each with `capacity` slots.
pub fn queue_endpoints(capacity: NonZeroUsize) -> (HandlerTable, EndpointReceivers) {
    let (validate_card, validate_card_rx) = QueueEndpoint::channel("validate-card", capacity);
    let (validate_pin, validate_pin_rx) = QueueEndpoint::channel("validate-pin", capacity);
    let (deposit, deposit_rx) = QueueEndpoint::channel("deposit", capacity);
    let (withdraw, withdraw_rx) = QueueEndpoint::channel("withdraw", capacity);
    let (inquiry, inquiry_rx) = QueueEndpoint::channel("inquiry", capacity);

    let table = HandlerTable {
        validate_card: Arc::new(validate_card),
        validate_pin: Arc::new(validate_pin),
        deposit: Arc::new(deposit),
        withdraw: Arc::new(withdraw),
        inquiry: Arc::new(inquiry),
    };
    let receivers = EndpointReceivers {
        validate_card: validate_card_rx,
        validate_pin: validate_pin_rx,
        deposit: deposit_rx,
        withdraw: withdraw_rx,
        inquiry: inquiry_rx,
    };
    (table, receivers)
}

/// Publishes every message received on `responses` to all connected
/// terminals.  Returns once every sender has been dropped.
pub async fn forward_responses(
    mut responses: mpsc::Receiver<AtmMessage>,
    publisher: BroadcastPublisher,
) {
    while let Some(msg) = responses.recv().await {
        let report = publisher.publish(&msg);
        if report.failed > 0 {
            warn!(
                "{} reached {}/{} terminal(s)",
                msg.summary(),
                report.delivered,
                report.attempted
            );
        }
    }
    debug!("response channel closed; stopping forwarder");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
