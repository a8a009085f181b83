//! BroadcastPublisher: pushes hub-originated messages to terminals.
//!
//! A message is encoded once and the resulting [`Frame`] is shared by every
//! recipient.  A failed send to one connection is logged and counted; it
//! never stops delivery to the others.

use std::sync::Arc;

use atm_core::protocol::{AtmMessage, Codec};
use tracing::{debug, error, warn};

use crate::application::registry::{ConnectionHandle, ConnectionRegistry, Frame};
use crate::domain::SessionId;

/// Delivery counts for one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections a send was attempted on.
    pub attempted: usize,
    /// Sends the connection accepted onto its outbound queue.
    pub delivered: usize,
    pub failed: usize,
}

impl PublishReport {
    fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Clone)]
pub struct BroadcastPublisher {
    registry: Arc<ConnectionRegistry>,
    codec: Arc<dyn Codec>,
}

impl BroadcastPublisher {
    pub fn new(registry: Arc<ConnectionRegistry>, codec: Arc<dyn Codec>) -> Self {
        Self { registry, codec }
    }

    /// Sends `msg` to every registered connection.
    pub fn publish(&self, msg: &AtmMessage) -> PublishReport {
        self.publish_where(msg, |_| true)
    }

    /// Sends `msg` to every registered connection whose id satisfies `pred`.
    pub fn publish_where<F>(&self, msg: &AtmMessage, mut pred: F) -> PublishReport
    where
        F: FnMut(&SessionId) -> bool,
    {
        let mut report = PublishReport::default();
        let Some(frame) = self.encode(msg) else {
            return report;
        };
        self.registry.for_each(|handle| {
            if pred(handle.id()) {
                report.record(deliver(handle.as_ref(), &frame));
            }
        });
        debug!(
            "published {} to {}/{} connection(s)",
            msg.summary(),
            report.delivered,
            report.attempted
        );
        report
    }

    /// Sends `msg` to the single connection `id`, if it is registered.
    pub fn send_to(&self, id: &SessionId, msg: &AtmMessage) -> PublishReport {
        let mut report = PublishReport::default();
        let Some(handle) = self.registry.get(id) else {
            debug!("send_to: session {id} is not registered");
            return report;
        };
        if let Some(frame) = self.encode(msg) {
            report.record(deliver(handle.as_ref(), &frame));
        }
        report
    }

    fn encode(&self, msg: &AtmMessage) -> Option<Frame> {
        match self.codec.encode(msg) {
            Ok(bytes) => Some(Frame::from(bytes)),
            Err(e) => {
                error!("failed to encode {}: {e}", msg.summary());
                None
            }
        }
    }
}

fn deliver(handle: &dyn ConnectionHandle, frame: &Frame) -> bool {
    match handle.send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(e) => {
            warn!("failed to send to session {}: {e}", handle.id());
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
