//! Integration tests for the lifecycle controller, router and publisher
//! working together over one shared registry.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atm_core::protocol::messages::{
    AtmMessage, CommandKind, DepositRequest, InquiryRequest, InquiryResponse, ValidateCardRequest,
    ValidatePinRequest, WithdrawRequest,
};
use atm_core::protocol::{decode_message, encode_message, BinaryCodec, Codec};
use atm_hub::application::{
    BroadcastPublisher, CommandHandler, CommandRouter, ConnectionHandle, ConnectionRegistry,
    Frame, HandlerError, HandlerTable, LifecycleController, MessageError, RouteOutcome, SendError,
};
use atm_hub::domain::{CloseStatus, SessionId};
use proptest::prelude::*;
use proptest::sample::Index;

// ── Test doubles ──────────────────────────────────────────────────────────────

/// Records every frame sent to it.
struct RecordingHandle {
    id: SessionId,
    frames: Mutex<Vec<Frame>>,
}

impl RecordingHandle {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::from(id),
            frames: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<AtmMessage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| decode_message(f).unwrap())
            .collect()
    }
}

impl ConnectionHandle for RecordingHandle {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}

/// Records the payloads it receives.
struct RecordingHandler<P> {
    calls: Mutex<Vec<P>>,
}

impl<P> RecordingHandler<P> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl<P: Send + 'static> CommandHandler<P> for RecordingHandler<P> {
    async fn handle(&self, payload: P) -> Result<(), HandlerError> {
        self.calls.lock().unwrap().push(payload);
        Ok(())
    }
}

/// Answers every inquiry by broadcasting a balance to all terminals.
struct BroadcastingInquiry {
    publisher: BroadcastPublisher,
    balance: i64,
}

#[async_trait]
impl CommandHandler<InquiryRequest> for BroadcastingInquiry {
    async fn handle(&self, payload: InquiryRequest) -> Result<(), HandlerError> {
        self.publisher.publish(&AtmMessage::InquiryResponse(InquiryResponse {
            card_number: payload.card_number,
            balance: self.balance,
        }));
        Ok(())
    }
}

struct Hub {
    controller: LifecycleController,
    validate_card: Arc<RecordingHandler<ValidateCardRequest>>,
    validate_pin: Arc<RecordingHandler<ValidatePinRequest>>,
    deposit: Arc<RecordingHandler<DepositRequest>>,
    withdraw: Arc<RecordingHandler<WithdrawRequest>>,
}

impl Hub {
    fn calls(&self) -> usize {
        self.validate_card.call_count()
            + self.validate_pin.call_count()
            + self.deposit.call_count()
            + self.withdraw.call_count()
    }
}

/// Builds a hub whose inquiry handler broadcasts a fixed balance.
fn hub() -> Hub {
    let registry = Arc::new(ConnectionRegistry::new());
    let codec: Arc<dyn Codec> = Arc::new(BinaryCodec);
    let publisher = BroadcastPublisher::new(Arc::clone(&registry), Arc::clone(&codec));

    let validate_card = RecordingHandler::new();
    let validate_pin = RecordingHandler::new();
    let deposit = RecordingHandler::new();
    let withdraw = RecordingHandler::new();
    let table = HandlerTable {
        validate_card: validate_card.clone(),
        validate_pin: validate_pin.clone(),
        deposit: deposit.clone(),
        withdraw: withdraw.clone(),
        inquiry: Arc::new(BroadcastingInquiry {
            publisher,
            balance: 1_250,
        }),
    };

    Hub {
        controller: LifecycleController::new(registry, CommandRouter::new(table), codec),
        validate_card,
        validate_pin,
        deposit,
        withdraw,
    }
}

fn inquiry_frame(card: &str) -> Vec<u8> {
    encode_message(&AtmMessage::InquiryRequest(InquiryRequest {
        card_number: card.into(),
    }))
    .unwrap()
}

fn balance(card: &str) -> AtmMessage {
    AtmMessage::InquiryResponse(InquiryResponse {
        card_number: card.into(),
        balance: 1_250,
    })
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inquiry_broadcast_reaches_every_open_session() {
    // Arrange
    let hub = hub();
    let a = RecordingHandle::new("A");
    let b = RecordingHandle::new("B");
    hub.controller.on_connect(a.clone());
    hub.controller.on_connect(b.clone());

    // Act: A asks for its balance; the handler broadcasts the answer
    let outcome = hub
        .controller
        .on_message(a.id(), &inquiry_frame("4000123412341234"))
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome, RouteOutcome::Dispatched(CommandKind::Inquiry));
    assert_eq!(a.received(), vec![balance("4000123412341234")]);
    assert_eq!(b.received(), vec![balance("4000123412341234")]);
}

#[tokio::test]
async fn test_closed_session_receives_no_further_broadcasts() {
    // Arrange
    let hub = hub();
    let a = RecordingHandle::new("A");
    let b = RecordingHandle::new("B");
    hub.controller.on_connect(a.clone());
    hub.controller.on_connect(b.clone());
    hub.controller
        .on_message(b.id(), &inquiry_frame("1111"))
        .await
        .unwrap();

    // Act: A closes, then B asks again
    hub.controller
        .on_close(a.id(), &CloseStatus::new(CloseStatus::NORMAL, "done"));
    hub.controller
        .on_message(b.id(), &inquiry_frame("2222"))
        .await
        .unwrap();

    // Assert: A saw only the first broadcast, B saw both
    assert_eq!(a.received(), vec![balance("1111")]);
    assert_eq!(b.received(), vec![balance("1111"), balance("2222")]);
}

#[tokio::test]
async fn test_unknown_and_response_events_invoke_no_handler() {
    // Arrange
    let hub = hub();
    let a = RecordingHandle::new("A");
    hub.controller.on_connect(a.clone());
    let unknown = encode_message(&AtmMessage::Unknown {
        event: 0x2A,
        data: b"opaque".to_vec(),
    })
    .unwrap();
    let echoed = encode_message(&balance("4000123412341234")).unwrap();

    // Act
    let first = hub.controller.on_message(a.id(), &unknown).await.unwrap();
    let second = hub.controller.on_message(a.id(), &echoed).await.unwrap();

    // Assert
    assert_eq!(first, RouteOutcome::Discarded);
    assert_eq!(second, RouteOutcome::Discarded);
    assert_eq!(hub.calls(), 0);
    assert!(a.received().is_empty(), "inquiry handler must not run");
}

#[tokio::test]
async fn test_decode_failure_leaves_session_open_and_others_unaffected() {
    // Arrange
    let hub = hub();
    let a = RecordingHandle::new("A");
    let b = RecordingHandle::new("B");
    hub.controller.on_connect(a.clone());
    hub.controller.on_connect(b.clone());
    let mut corrupted = inquiry_frame("4000123412341234");
    corrupted[0] = 0x09;

    // Act
    let result = hub.controller.on_message(a.id(), &corrupted).await;
    let after = hub
        .controller
        .on_message(a.id(), &inquiry_frame("3333"))
        .await;

    // Assert
    assert!(matches!(result, Err(MessageError::Decode(_))));
    assert!(after.is_ok());
    assert_eq!(hub.controller.registry().len(), 2);
    assert_eq!(b.received(), vec![balance("3333")]);
}

#[tokio::test]
async fn test_each_request_kind_reaches_its_own_handler() {
    let hub = hub();
    let a = RecordingHandle::new("A");
    hub.controller.on_connect(a.clone());
    let card = "4000123412341234".to_string();

    let frames = [
        AtmMessage::ValidateCardRequest(ValidateCardRequest {
            card_number: card.clone(),
        }),
        AtmMessage::ValidatePinRequest(ValidatePinRequest {
            card_number: card.clone(),
            pin: "9876".into(),
        }),
        AtmMessage::DepositRequest(DepositRequest {
            card_number: card.clone(),
            amount: 10_000,
        }),
        AtmMessage::WithdrawRequest(WithdrawRequest {
            card_number: card,
            amount: 2_000,
        }),
    ];
    for msg in &frames {
        hub.controller
            .on_message(a.id(), &encode_message(msg).unwrap())
            .await
            .unwrap();
    }

    assert_eq!(hub.validate_card.call_count(), 1);
    assert_eq!(hub.validate_pin.call_count(), 1);
    assert_eq!(hub.deposit.call_count(), 1);
    assert_eq!(hub.withdraw.call_count(), 1);
    assert_eq!(hub.deposit.calls.lock().unwrap()[0].amount, 10_000);
}

// ── Registry membership ───────────────────────────────────────────────────────

/// One lifecycle callback in a generated interleaving.
///
/// `Close` and `Error` pick among every id issued so far plus one that was
/// never opened, so stray and repeated removals are covered too.
#[derive(Debug, Clone)]
enum Op {
    Connect,
    Close(Index),
    Error(Index),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Connect),
        1 => any::<Index>().prop_map(Op::Close),
        1 => any::<Index>().prop_map(Op::Error),
    ]
}

fn live_ids(hub: &Hub) -> HashSet<SessionId> {
    hub.controller
        .registry()
        .snapshot()
        .iter()
        .map(|h| h.id().clone())
        .collect()
}

proptest! {
    #[test]
    fn test_membership_matches_callbacks_over_any_interleaving(
        ops in proptest::collection::vec(arb_op(), 0..200),
    ) {
        let hub = hub();
        let mut model: HashSet<SessionId> = HashSet::new();
        let mut issued = 0usize;

        for op in ops {
            match op {
                Op::Connect => {
                    let id = format!("s{issued}");
                    issued += 1;
                    hub.controller.on_connect(RecordingHandle::new(&id));
                    model.insert(SessionId::from(id));
                }
                Op::Close(pick) => {
                    let id = SessionId::from(format!("s{}", pick.index(issued + 1)));
                    hub.controller.on_close(&id, &CloseStatus::abnormal());
                    model.remove(&id);
                }
                Op::Error(pick) => {
                    let id = SessionId::from(format!("s{}", pick.index(issued + 1)));
                    hub.controller.on_error(&id, "reset by peer");
                    model.remove(&id);
                }
            }

            prop_assert_eq!(live_ids(&hub), model.clone());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_end_with_empty_registry() {
    // Arrange
    let hub = Arc::new(hub());

    // Act: 32 tasks each open, send two inquiries and close one session
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                let handle = RecordingHandle::new(&format!("t{i}"));
                hub.controller.on_connect(handle.clone());
                for _ in 0..2 {
                    hub.controller
                        .on_message(handle.id(), &inquiry_frame("5555"))
                        .await
                        .unwrap();
                }
                if i % 2 == 0 {
                    hub.controller.on_close(handle.id(), &CloseStatus::abnormal());
                } else {
                    hub.controller.on_error(handle.id(), "timeout");
                }
                handle
            })
        })
        .collect();

    let mut handles = Vec::new();
    for t in tasks {
        handles.push(t.await.unwrap());
    }

    // Assert
    assert!(hub.controller.registry().is_empty());
    for h in &handles {
        // Each session saw at least its own two answers.
        assert!(h.received().len() >= 2, "session {} got too few", h.id());
    }
}
