//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from ATM terminals.
//! 3. Upgrading each connection to a WebSocket session and minting its
//!    [`SessionId`].
//! 4. Driving the [`LifecycleController`] callbacks for that session:
//!    `on_connect` once, `on_message` per binary frame, then exactly one of
//!    `on_close` / `on_error`.
//! 5. Running a writer task per session that drains the outbound frame queue
//!    filled by [`WsConnectionHandle::send`].
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Ordering
//!
//! Frames from one terminal are handed to the controller one at a time, in
//! arrival order.  Frames from different terminals are processed
//! concurrently, one Tokio task per session.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        error::ProtocolError, protocol::CloseFrame, Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::application::{ConnectionHandle, Frame, LifecycleController, SendError};
use crate::domain::{CloseStatus, HubConfig, SessionId, SessionState};

/// How often the accept loop wakes up to check the `running` flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a finished session waits for its writer to flush.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Connection handle ─────────────────────────────────────────────────────────

/// The [`ConnectionHandle`] for one WebSocket session.
///
/// `send` pushes onto a bounded queue drained by the session's writer task.
/// It never waits: when the queue is full the frame is refused with
/// [`SendError::Backpressure`], so a terminal that stops reading cannot hold
/// more than the queue's capacity in hub memory.
pub struct WsConnectionHandle {
    id: SessionId,
    outbound: mpsc::Sender<Frame>,
}

impl WsConnectionHandle {
    pub fn new(id: SessionId, outbound: mpsc::Sender<Frame>) -> Self {
        Self { id, outbound }
    }
}

impl ConnectionHandle for WsConnectionHandle {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backpressure(self.id.clone()),
            TrySendError::Closed(_) => SendError::Closed(self.id.clone()),
        })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket TCP listener on `config.bind_addr`.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks
/// permission to bind it.
pub async fn bind(config: &HubConfig) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;
    info!("ATM hub listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts connections on `listener` until `running` is set to `false`.
///
/// Each accepted connection is handed to its own Tokio task, so one slow
/// terminal never blocks the others.  Every session gets an outbound queue
/// of `outbound_capacity` frames.
pub async fn serve(
    listener: TcpListener,
    controller: Arc<LifecycleController>,
    outbound_capacity: NonZeroUsize,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout lets the loop notice the flag while idle.
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new terminal connection from {peer_addr}");
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    handle_terminal_session(stream, peer_addr, controller, outbound_capacity)
                        .await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

/// Binds on `config.bind_addr` and serves until `running` is cleared.
pub async fn run_server(
    config: HubConfig,
    controller: Arc<LifecycleController>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    serve(listener, controller, config.outbound_queue_capacity, running).await
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// How a session's read side came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Closed(CloseStatus),
    Errored(String),
}

impl SessionEnd {
    fn state(&self) -> SessionState {
        match self {
            SessionEnd::Closed(_) => SessionState::Closed,
            SessionEnd::Errored(_) => SessionState::Errored,
        }
    }
}

/// Wraps [`run_session`] and logs failures that happen before the session
/// is registered.
async fn handle_terminal_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    controller: Arc<LifecycleController>,
    outbound_capacity: NonZeroUsize,
) {
    if let Err(e) = run_session(raw_stream, peer_addr, controller, outbound_capacity).await {
        warn!("connection from {peer_addr} failed: {e:#}");
    }
}

/// Runs the complete lifecycle of one terminal session.
///
/// # Errors
///
/// Returns an error only if the WebSocket handshake fails, in which case no
/// lifecycle callback has fired.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    controller: Arc<LifecycleController>,
    outbound_capacity: NonZeroUsize,
) -> anyhow::Result<()> {
    // ── Step 1: Complete the WebSocket handshake ───────────────────────────────
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();

    // ── Step 2: Register the session ──────────────────────────────────────────
    let id = SessionId::random();
    let (out_tx, out_rx) = mpsc::channel::<Frame>(outbound_capacity.get());
    controller.on_connect(Arc::new(WsConnectionHandle::new(id.clone(), out_tx)));
    debug!("Session ID : {id} - peer {peer_addr}");

    // ── Task A: Writer ────────────────────────────────────────────────────────
    //
    // Ends when every sender is gone, i.e. once the handle has left the
    // registry and no publisher still holds a snapshot of it.
    let mut writer = tokio::spawn(write_frames(ws_tx, out_rx, id.clone()));

    // ── Step 3: Read until the terminal goes away ─────────────────────────────
    let end = read_frames(&mut ws_rx, &id, &controller).await;
    match &end {
        SessionEnd::Closed(status) => controller.on_close(&id, status),
        SessionEnd::Errored(reason) => controller.on_error(&id, reason),
    }
    debug!("Session ID : {id} - {:?}", end.state());

    // ── Step 4: Let the writer flush, then stop it ────────────────────────────
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("Session ID : {id} - writer still busy; aborting");
        writer.abort();
    }

    Ok(())
}

/// Drains `outbound` into the WebSocket sink as binary frames.
async fn write_frames<S>(mut sink: S, mut outbound: mpsc::Receiver<Frame>, id: SessionId)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(WsMessage::Binary(frame.to_vec())).await {
            debug!("Session ID : {id} - send failed (terminal disconnected): {e}");
            break;
        }
    }
    // Completes a pending close handshake, or starts one if we are first.
    let _ = sink.close().await;
}

/// Feeds inbound frames to the controller until the stream ends.
///
/// A frame the controller rejects is logged and the session stays open.
async fn read_frames<S>(
    ws_rx: &mut S,
    id: &SessionId,
    controller: &LifecycleController,
) -> SessionEnd
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
            )) => return SessionEnd::Closed(CloseStatus::abnormal()),
            Some(Err(e)) => return SessionEnd::Errored(e.to_string()),
            None => return SessionEnd::Closed(CloseStatus::abnormal()),
        };

        match ws_msg {
            WsMessage::Binary(data) => match controller.on_message(id, &data).await {
                Ok(outcome) => debug!("Session ID : {id} - {outcome:?}"),
                Err(e) => warn!("Session ID : {id} - message dropped: {e}"),
            },
            WsMessage::Text(_) => {
                warn!("Session ID : {id} - unexpected text frame (ignored)");
            }
            WsMessage::Ping(data) => {
                debug!("Session ID : {id} - WebSocket ping ({} bytes)", data.len());
            }
            WsMessage::Pong(_) => {}
            WsMessage::Close(frame) => return SessionEnd::Closed(close_status(frame)),
            WsMessage::Frame(_) => {
                debug!("Session ID : {id} - raw frame (ignored)");
            }
        }
    }
}

fn close_status(frame: Option<CloseFrame<'_>>) -> CloseStatus {
    match frame {
        Some(frame) => CloseStatus::new(u16::from(frame.code), frame.reason.into_owned()),
        None => CloseStatus::no_status(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        BroadcastPublisher, CommandHandler, CommandRouter, ConnectionRegistry, HandlerError,
        HandlerTable, PublishReport,
    };
    use async_trait::async_trait;
    use atm_core::protocol::messages::{AtmMessage, InquiryRequest, InquiryResponse};
    use atm_core::protocol::{decode_message, encode_message, BinaryCodec};
    use futures_util::stream;
    use std::sync::atomic::AtomicUsize;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[derive(Default)]
    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl<P: Send + 'static> CommandHandler<P> for CountingHandler {
        async fn handle(&self, _payload: P) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller(handler: Arc<CountingHandler>) -> LifecycleController {
        LifecycleController::new(
            Arc::new(ConnectionRegistry::new()),
            CommandRouter::new(HandlerTable {
                validate_card: handler.clone(),
                validate_pin: handler.clone(),
                deposit: handler.clone(),
                withdraw: handler.clone(),
                inquiry: handler,
            }),
            Arc::new(BinaryCodec),
        )
    }

    fn registered(ctl: &LifecycleController) -> SessionId {
        let id = SessionId::from("t1");
        let (tx, _rx) = mpsc::channel(4);
        ctl.on_connect(Arc::new(WsConnectionHandle::new(id.clone(), tx)));
        id
    }

    fn inquiry_frame() -> Vec<u8> {
        encode_message(&AtmMessage::InquiryRequest(InquiryRequest {
            card_number: "4000123412341234".into(),
        }))
        .unwrap()
    }

    #[test]
    fn test_close_status_from_frame() {
        let status = close_status(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }));
        assert_eq!(status, CloseStatus::new(1000, "bye"));
    }

    #[test]
    fn test_close_status_without_frame_is_1005() {
        assert_eq!(close_status(None).code, CloseStatus::NO_STATUS);
    }

    #[test]
    fn test_handle_send_after_writer_gone_is_closed() {
        let (tx, rx) = mpsc::channel(1);
        let handle = WsConnectionHandle::new(SessionId::from("x"), tx);
        drop(rx);

        let result = handle.send(Frame::from(vec![1u8, 2, 3]));

        assert_eq!(result, Err(SendError::Closed(SessionId::from("x"))));
    }

    #[tokio::test]
    async fn test_handle_send_queues_frame() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = WsConnectionHandle::new(SessionId::from("x"), tx);

        handle.send(Frame::from(vec![7u8])).unwrap();

        assert_eq!(rx.recv().await.unwrap().as_ref(), &[7u8]);
    }

    #[test]
    fn test_handle_send_to_full_queue_is_backpressure() {
        // Arrange: a one-slot queue nobody drains
        let (tx, _rx) = mpsc::channel(1);
        let handle = WsConnectionHandle::new(SessionId::from("x"), tx);
        handle.send(Frame::from(vec![1u8])).unwrap();

        // Act
        let result = handle.send(Frame::from(vec![2u8]));

        // Assert
        assert_eq!(result, Err(SendError::Backpressure(SessionId::from("x"))));
    }

    #[test]
    fn test_stalled_terminal_fails_sends_while_others_still_receive() {
        // Arrange: "stalled" never drains its queue, "live" is drained after
        // every publish
        let registry = Arc::new(ConnectionRegistry::new());
        let (stalled_tx, _stalled_rx) = mpsc::channel(2);
        let (live_tx, mut live_rx) = mpsc::channel(2);
        registry.add(Arc::new(WsConnectionHandle::new(SessionId::from("stalled"), stalled_tx)));
        registry.add(Arc::new(WsConnectionHandle::new(SessionId::from("live"), live_tx)));
        let publisher = BroadcastPublisher::new(registry, Arc::new(BinaryCodec));
        let message = AtmMessage::InquiryResponse(InquiryResponse {
            card_number: "4000123412341234".into(),
            balance: 1_250,
        });

        // Act
        let mut reports = Vec::new();
        let mut live_frames = 0;
        for _ in 0..5 {
            reports.push(publisher.publish(&message));
            while let Ok(frame) = live_rx.try_recv() {
                assert_eq!(decode_message(&frame).unwrap(), message);
                live_frames += 1;
            }
        }

        // Assert: the stalled queue holds two frames and refuses the rest
        let full = PublishReport { attempted: 2, delivered: 2, failed: 0 };
        let stalled = PublishReport { attempted: 2, delivered: 1, failed: 1 };
        assert_eq!(reports, vec![full, full, stalled, stalled, stalled]);
        assert_eq!(live_frames, 5);
    }

    #[tokio::test]
    async fn test_read_frames_dispatches_binary_and_ends_on_close() {
        // Arrange
        let handler = Arc::new(CountingHandler::default());
        let ctl = controller(handler.clone());
        let id = registered(&ctl);
        let items: Vec<Result<WsMessage, WsError>> = vec![
            Ok(WsMessage::Binary(inquiry_frame())),
            Ok(WsMessage::Text("hello".into())),
            Ok(WsMessage::Binary(vec![0xFF, 0x00])),
            Ok(WsMessage::Binary(inquiry_frame())),
            Ok(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "shutting down".into(),
            }))),
            Ok(WsMessage::Binary(inquiry_frame())),
        ];
        let mut frames = stream::iter(items);

        // Act
        let end = read_frames(&mut frames, &id, &ctl).await;

        // Assert: the malformed frame and the text frame were skipped, and
        // nothing after the close frame was read
        assert_eq!(end, SessionEnd::Closed(CloseStatus::new(1001, "shutting down")));
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_frames_stream_end_is_abnormal_close() {
        let ctl = controller(Arc::default());
        let id = registered(&ctl);
        let mut frames = stream::iter(Vec::<Result<WsMessage, WsError>>::new());

        let end = read_frames(&mut frames, &id, &ctl).await;

        assert_eq!(end, SessionEnd::Closed(CloseStatus::abnormal()));
    }

    #[tokio::test]
    async fn test_read_frames_reset_is_abnormal_close() {
        let ctl = controller(Arc::default());
        let id = registered(&ctl);
        let items: Vec<Result<WsMessage, WsError>> = vec![Err(WsError::Protocol(
            ProtocolError::ResetWithoutClosingHandshake,
        ))];
        let mut frames = stream::iter(items);

        let end = read_frames(&mut frames, &id, &ctl).await;

        assert_eq!(end.state(), SessionState::Closed);
        assert_eq!(end, SessionEnd::Closed(CloseStatus::abnormal()));
    }

    #[tokio::test]
    async fn test_read_frames_transport_error_is_errored() {
        let ctl = controller(Arc::default());
        let id = registered(&ctl);
        let items: Vec<Result<WsMessage, WsError>> = vec![Err(WsError::Io(
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"),
        ))];
        let mut frames = stream::iter(items);

        let end = read_frames(&mut frames, &id, &ctl).await;

        assert_eq!(end.state(), SessionState::Errored);
    }
}
