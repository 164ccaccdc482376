//! Socket.IO WebSocket Session
//!
//! [`Transport`] and [`Session`] adapters for CoinCap's Socket.IO endpoint.
//!
//! # Stream URL
//!
//! - `wss://coincap.io:443/socket.io/?EIO=3&transport=websocket`
//!
//! # Lifecycle
//!
//! 1. `connect` dials the WebSocket and waits for the Engine.IO open
//!    handshake, which carries the session id and heartbeat timing.
//! 2. Registering the first event handler starts the reader task. Events
//!    that arrive are dispatched to the handler registered for their name.
//! 3. The reader reports disconnects and errors to the registered failure
//!    handlers, then exits.
//! 4. `close` cancels the reader (even mid-dispatch), waits for it to exit,
//!    and is idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::socketio::{EnginePacket, Handshake, SocketIoCodec, SocketPacket};
use crate::application::ports::{
    EventHandler, FailureHandler, HandlerKind, Session, Transport, TransportError,
    TransportFailure,
};
use crate::infrastructure::config::StreamSettings;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// =============================================================================
// Configuration
// =============================================================================

/// Timing knobs for Socket.IO sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound for dialling plus the open handshake, each.
    pub handshake_timeout: Duration,
    /// Upper bound for a graceful close before the reader is aborted.
    pub close_timeout: Duration,
    /// Ping interval override; `None` uses the server's value.
    pub ping_interval: Option<Duration>,
    /// Pong timeout override; `None` uses the server's value.
    pub pong_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            ping_interval: None,
            pong_timeout: None,
        }
    }
}

impl SessionSettings {
    /// Session timing from the stream configuration.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            handshake_timeout: settings.handshake_timeout,
            close_timeout: settings.close_timeout,
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Dials Socket.IO sessions over WebSocket.
#[derive(Debug, Clone, Default)]
pub struct SocketIoTransport {
    settings: SessionSettings,
    codec: SocketIoCodec,
}

impl SocketIoTransport {
    /// Create a transport with the given session timing.
    #[must_use]
    pub const fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            codec: SocketIoCodec::new(),
        }
    }

    async fn await_handshake(&self, read: &mut WsRead) -> Result<Handshake, TransportError> {
        while let Some(frame) = read.next().await {
            match frame.map_err(|e| TransportError::Handshake(e.to_string()))? {
                Message::Text(text) => match self.codec.decode(&text) {
                    Ok(EnginePacket::Open(handshake)) => return Ok(handshake),
                    Ok(other) => tracing::trace!(?other, "Ignoring frame before handshake"),
                    Err(e) => return Err(TransportError::Handshake(e.to_string())),
                },
                Message::Close(_) => {
                    return Err(TransportError::Handshake(
                        "server closed during handshake".to_string(),
                    ));
                }
                _ => {}
            }
        }

        Err(TransportError::Handshake(
            "stream ended before handshake".to_string(),
        ))
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    type Session = SocketIoSession;

    async fn connect(&self, url: &str) -> Result<Self::Session, TransportError> {
        let limit = self.settings.handshake_timeout;
        tracing::info!(url, "Connecting to stream");

        let (ws_stream, _response) =
            tokio::time::timeout(limit, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::Dial(format!("timed out after {limit:?}")))?
                .map_err(|e| TransportError::Dial(e.to_string()))?;

        let (write, mut read) = ws_stream.split();

        let handshake = tokio::time::timeout(limit, self.await_handshake(&mut read))
            .await
            .map_err(|_| TransportError::Handshake(format!("no open packet within {limit:?}")))??;

        let heartbeat = HeartbeatConfig::from_handshake(&handshake)
            .with_overrides(self.settings.ping_interval, self.settings.pong_timeout);

        tracing::debug!(
            session = %handshake.sid,
            ping_interval_ms = heartbeat.ping_interval.as_millis(),
            pong_timeout_ms = heartbeat.pong_timeout.as_millis(),
            "Stream handshake complete"
        );

        Ok(SocketIoSession {
            shared: Arc::new(Shared::new(handshake.sid)),
            io: Some((write, read)),
            heartbeat,
            codec: self.codec.clone(),
            cancel: CancellationToken::new(),
            reader: None,
            close_timeout: self.settings.close_timeout,
            closed: false,
        })
    }
}

// =============================================================================
// Handler Registry
// =============================================================================

#[derive(Default)]
struct Handlers {
    events: HashMap<String, EventHandler>,
    disconnect: Option<FailureHandler>,
    error: Option<FailureHandler>,
    /// Failure reported before its handler was registered.
    unreported: Option<TransportFailure>,
}

/// State shared between the session handle and its reader task.
struct Shared {
    session_id: String,
    handlers: Mutex<Handlers>,
}

impl Shared {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            handlers: Mutex::new(Handlers::default()),
        }
    }

    fn event_handler(&self, name: &str) -> Option<EventHandler> {
        self.handlers.lock().events.get(name).cloned()
    }

    fn disconnected(&self, reason: impl Into<String>) -> TransportFailure {
        TransportFailure::Disconnected {
            session: self.session_id.clone(),
            reason: reason.into(),
        }
    }

    fn protocol(&self, reason: impl Into<String>) -> TransportFailure {
        TransportFailure::Protocol {
            session: self.session_id.clone(),
            reason: reason.into(),
        }
    }

    /// Fire the handler matching `failure`, or keep it until one is registered.
    fn report(&self, failure: TransportFailure) {
        let handler = {
            let mut handlers = self.handlers.lock();
            let handler = match failure {
                TransportFailure::Disconnected { .. } => handlers.disconnect.clone(),
                TransportFailure::Protocol { .. } => handlers.error.clone(),
            };
            if handler.is_none() && handlers.unreported.is_none() {
                handlers.unreported = Some(failure.clone());
            }
            handler
        };

        if let Some(handler) = handler {
            handler(failure);
        }
    }

    fn set_failure_handler(&self, kind: HandlerKind, handler: FailureHandler) {
        let replay = {
            let mut handlers = self.handlers.lock();
            match kind {
                HandlerKind::Disconnect => handlers.disconnect = Some(Arc::clone(&handler)),
                HandlerKind::Error => handlers.error = Some(Arc::clone(&handler)),
                HandlerKind::Event => return,
            }
            let matches = matches!(
                (&handlers.unreported, kind),
                (Some(TransportFailure::Disconnected { .. }), HandlerKind::Disconnect)
                    | (Some(TransportFailure::Protocol { .. }), HandlerKind::Error)
            );
            if matches {
                handlers.unreported.take()
            } else {
                None
            }
        };

        if let Some(failure) = replay {
            handler(failure);
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One Socket.IO connection.
pub struct SocketIoSession {
    shared: Arc<Shared>,
    /// Socket halves, held until the reader starts.
    io: Option<(WsWrite, WsRead)>,
    heartbeat: HeartbeatConfig,
    codec: SocketIoCodec,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    close_timeout: Duration,
    closed: bool,
}

impl std::fmt::Debug for SocketIoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoSession")
            .field("session_id", &self.shared.session_id)
            .field("started", &self.reader.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SocketIoSession {
    fn ensure_open(&self, kind: HandlerKind) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Registration {
                kind,
                reason: "session is closed".to_string(),
            });
        }
        Ok(())
    }

    fn start_reader(&mut self) {
        if let Some((write, read)) = self.io.take() {
            let reader = Reader {
                shared: Arc::clone(&self.shared),
                codec: self.codec.clone(),
                cancel: self.cancel.clone(),
                heartbeat: self.heartbeat.clone(),
            };
            self.reader = Some(tokio::spawn(reader.run(write, read)));
        }
    }
}

#[async_trait]
impl Session for SocketIoSession {
    fn id(&self) -> &str {
        &self.shared.session_id
    }

    fn on_event(&mut self, name: &str, handler: EventHandler) -> Result<(), TransportError> {
        self.ensure_open(HandlerKind::Event)?;

        {
            let mut handlers = self.shared.handlers.lock();
            if handlers.events.contains_key(name) {
                return Err(TransportError::Registration {
                    kind: HandlerKind::Event,
                    reason: format!("handler for '{name}' already registered"),
                });
            }
            handlers.events.insert(name.to_string(), handler);
        }

        self.start_reader();
        Ok(())
    }

    fn on_disconnect(&mut self, handler: FailureHandler) -> Result<(), TransportError> {
        self.ensure_open(HandlerKind::Disconnect)?;
        self.shared
            .set_failure_handler(HandlerKind::Disconnect, handler);
        Ok(())
    }

    fn on_error(&mut self, handler: FailureHandler) -> Result<(), TransportError> {
        self.ensure_open(HandlerKind::Error)?;
        self.shared.set_failure_handler(HandlerKind::Error, handler);
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();

        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(self.close_timeout, &mut reader)
                .await
                .is_err()
            {
                tracing::warn!(session = %self.shared.session_id, "Reader did not stop in time, aborting");
                reader.abort();
            }
        } else if let Some((mut write, _read)) = self.io.take() {
            let _ = tokio::time::timeout(self.close_timeout, write.close()).await;
        }

        tracing::info!(session = %self.shared.session_id, "Stream session closed");
    }
}

impl Drop for SocketIoSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Reader Task
// =============================================================================

enum ReadOutcome {
    Cancelled,
    Failed(TransportFailure),
}

struct Reader {
    shared: Arc<Shared>,
    codec: SocketIoCodec,
    cancel: CancellationToken,
    heartbeat: HeartbeatConfig,
}

impl Reader {
    async fn run(self, mut write: WsWrite, mut read: WsRead) {
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(4);
        let heartbeat_cancel = self.cancel.child_token();
        let heartbeat = HeartbeatManager::new(
            self.heartbeat.clone(),
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let heartbeat_handle = tokio::spawn(heartbeat.run());

        let outcome = self
            .read_loop(&mut write, &mut read, &heartbeat_state, &mut heartbeat_rx)
            .await;

        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        match outcome {
            ReadOutcome::Cancelled => {
                let _ = write
                    .send(Message::Text(self.codec.close().to_string().into()))
                    .await;
                let _ = write.close().await;
            }
            ReadOutcome::Failed(failure) => {
                tracing::warn!(error = %failure, "Stream session lost");
                self.shared.report(failure);
            }
        }
    }

    async fn read_loop(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        heartbeat_state: &HeartbeatState,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> ReadOutcome {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return ReadOutcome::Cancelled,
                Some(event) = heartbeat_rx.recv() => match event {
                    HeartbeatEvent::SendPing => {
                        heartbeat_state.mark_ping_sent();
                        if let Err(failure) = self.send_text(write, self.codec.ping().to_string()).await {
                            return ReadOutcome::Failed(failure);
                        }
                    }
                    HeartbeatEvent::Timeout => {
                        return ReadOutcome::Failed(self.shared.protocol("heartbeat timeout"));
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        // Clears any outstanding ping before dispatch can block on the sink.
                        heartbeat_state.record_pong();
                        if let Some(outcome) = self.handle_text(&text, write).await {
                            return outcome;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return ReadOutcome::Failed(self.shared.protocol(e.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "server sent close frame".to_string(),
                            |f| format!("server sent close frame ({}): {}", f.code, &*f.reason),
                        );
                        return ReadOutcome::Failed(self.shared.disconnected(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return ReadOutcome::Failed(self.shared.protocol(e.to_string())),
                    None => return ReadOutcome::Failed(self.shared.disconnected("stream ended")),
                },
            }
        }
    }

    /// Handle one text frame. Returns `Some` when the loop must end.
    async fn handle_text(&self, text: &str, write: &mut WsWrite) -> Option<ReadOutcome> {
        let packet = match self.codec.decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                return Some(ReadOutcome::Failed(
                    self.shared.protocol(format!("undecodable frame: {e}")),
                ));
            }
        };

        match packet {
            EnginePacket::Message(SocketPacket::Event { name, payload, .. }) => {
                let Some(handler) = self.shared.event_handler(&name) else {
                    tracing::trace!(event = %name, "No handler registered, event ignored");
                    return None;
                };
                tokio::select! {
                    () = self.cancel.cancelled() => return Some(ReadOutcome::Cancelled),
                    () = handler(payload) => {}
                }
            }
            EnginePacket::Ping(probe) => {
                if let Err(failure) = self.send_text(write, self.codec.pong(&probe)).await {
                    return Some(ReadOutcome::Failed(failure));
                }
            }
            EnginePacket::Close => {
                return Some(ReadOutcome::Failed(
                    self.shared.disconnected("server closed the engine session"),
                ));
            }
            EnginePacket::Message(SocketPacket::Disconnect { namespace }) => {
                return Some(ReadOutcome::Failed(
                    self.shared
                        .disconnected(format!("namespace {namespace} disconnected")),
                ));
            }
            EnginePacket::Message(SocketPacket::Error { namespace, message }) => {
                return Some(ReadOutcome::Failed(
                    self.shared
                        .protocol(format!("namespace {namespace} error: {message}")),
                ));
            }
            EnginePacket::Message(SocketPacket::Connect { namespace }) => {
                tracing::debug!(%namespace, "Namespace connected");
            }
            other => tracing::trace!(?other, "Ignoring control frame"),
        }

        None
    }

    async fn send_text(&self, write: &mut WsWrite, text: String) -> Result<(), TransportFailure> {
        write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| self.shared.protocol(format!("send failed: {e}")))
    }
}
