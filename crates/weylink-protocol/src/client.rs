//! WebSocket client: connection lifecycle, reader and dispatcher loops, and
//! command/response correlation.
//!
//! After [`ProtocolClient::connect`] two tasks run until the client's
//! cancellation token fires:
//!
//! - the reader pulls one message at a time off the socket and queues it;
//!   any transport error or server close is fatal to the whole client.
//! - the dispatcher hands text messages to every callback whose tag occurs
//!   in the payload, and binary messages to the [`BinarySink`].
//!
//! [`ProtocolClient::invoke`] registers one-shot callbacks for the reply
//! tags a command can produce, sends the command and waits for the first
//! callback to fire, the token to be cancelled, or the per-call timeout.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use weylink_types::{
    CapturableList, CaptureConfig, Command, KeyboardEvent, OutboundContent, PointerEvent,
    Response, WheelEvent,
};

use crate::callback::{CallbackRegistry, CallbackToken};
use crate::error::ProtocolError;
use crate::sink::BinarySink;
use crate::wire::{self, FromInbound, Inbound, MAX_MESSAGE_SIZE};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Largest inbound message or frame accepted, in bytes.
    pub read_limit: usize,
    /// How long [`ProtocolClient::invoke`] waits for a reply.
    pub command_timeout: Duration,
    /// Capacity of the reader-to-dispatcher queue.
    pub queue_depth: usize,
    /// Target frame rate of [`ProtocolClient::run_video`].
    pub fps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_limit: MAX_MESSAGE_SIZE,
            command_timeout: Duration::from_secs(10),
            queue_depth: 256,
            fps: 30,
        }
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ShuttingDown => "shutting down",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

enum Queued {
    Text(String),
    Binary(Vec<u8>),
}

struct Inner {
    config: ClientConfig,
    state: watch::Sender<ClientState>,
    callbacks: CallbackRegistry,
    cancel: CancellationToken,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    sink: Mutex<Option<Box<dyn BinarySink>>>,
    video_requested: AtomicBool,
    video_confirmed: Arc<AtomicBool>,
}

impl Inner {
    fn set_state(&self, state: ClientState) {
        self.state.send_replace(state);
    }

    /// Drop the writer and mark the client closed, optionally sending a
    /// normal-closure frame first. Only the first caller sends the frame.
    async fn finish(&self, send_close: bool) {
        let mut guard = self.writer.lock().await;
        let writer = guard.take();
        // Under the lock, so a sender that finds no writer also sees Closed.
        self.set_state(ClientState::Closed);
        drop(guard);
        let (Some(mut writer), true) = (writer, send_close) else {
            return;
        };
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = writer.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "close frame not delivered");
        }
        if let Err(e) = writer.close().await {
            debug!(error = %e, "websocket close failed");
        }
    }

    /// Tear the client down after a transport failure. The state is Closed
    /// before anything observes the cancellation.
    async fn fail(&self) {
        self.finish(false).await;
        self.cancel.cancel();
    }
}

/// Removes an invocation's reply callbacks when dropped, whichever way the
/// invocation ends.
struct PendingReply<'a> {
    callbacks: &'a CallbackRegistry,
    tokens: Vec<(Response, CallbackToken)>,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        for (tag, token) in self.tokens.drain(..) {
            self.callbacks.remove(tag, token);
        }
    }
}

/// Handle to one server connection. Clones share the connection.
#[derive(Clone)]
pub struct ProtocolClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("state", &self.state())
            .field("video_confirmed", &self.is_video_confirmed())
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a client scoped to `cancel`. Cancelling the token closes the
    /// client and unblocks every pending call.
    pub fn with_cancellation(config: ClientConfig, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(ClientState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                callbacks: CallbackRegistry::new(),
                cancel,
                writer: tokio::sync::Mutex::new(None),
                sink: Mutex::new(None),
                video_requested: AtomicBool::new(false),
                video_confirmed: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ClientState> {
        self.inner.state.subscribe()
    }

    /// Wait until the client reaches [`ClientState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == ClientState::Closed).await;
    }

    /// The callback registry shared with the dispatcher.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.inner.callbacks
    }

    /// Set where inbound binary messages go. Must be called before
    /// [`connect`](Self::connect); binary messages are dropped without one.
    pub fn set_binary_sink(&self, sink: impl BinarySink) {
        *self.inner.sink.lock() = Some(Box::new(sink));
    }

    /// Open the websocket and start the reader and dispatcher tasks.
    ///
    /// A client connects once; after it closes, build a new one.
    pub async fn connect(&self, url: &str) -> Result<(), ProtocolError> {
        let mut current = ClientState::Disconnected;
        let claimed = self.inner.state.send_if_modified(|state| {
            current = *state;
            if *state == ClientState::Disconnected {
                *state = ClientState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ProtocolError::InvalidState {
                current,
                expected: ClientState::Disconnected,
            });
        }

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.inner.config.read_limit);
        ws_config.max_frame_size = Some(self.inner.config.read_limit);

        debug!(url, "connecting");
        let stream = tokio::select! {
            () = self.inner.cancel.cancelled() => {
                self.inner.set_state(ClientState::Closed);
                return Err(ProtocolError::Cancelled);
            }
            result = connect_async_with_config(url, Some(ws_config), false) => match result {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    self.inner.set_state(ClientState::Disconnected);
                    return Err(ProtocolError::Transport(e.to_string()));
                }
            },
        };

        let (writer, reader) = stream.split();
        *self.inner.writer.lock().await = Some(writer);

        let (queue_tx, queue_rx) = mpsc::channel(self.inner.config.queue_depth.max(1));
        let sink = self.inner.sink.lock().take();
        tokio::spawn(read_loop(Arc::clone(&self.inner), reader, queue_tx));
        tokio::spawn(dispatch_loop(Arc::clone(&self.inner), queue_rx, sink));

        self.inner.set_state(ClientState::Connected);
        info!(url, "connected");
        Ok(())
    }

    /// Send one message without waiting for a reply.
    pub async fn send(&self, content: &OutboundContent) -> Result<(), ProtocolError> {
        let envelope = wire::wrap(content)?;
        let command = envelope.command();
        let mut writer = self.inner.writer.lock().await;
        let Some(ws) = writer.as_mut() else {
            return Err(ProtocolError::NotConnected);
        };
        if let Err(e) = ws.send(Message::Text(envelope.to_text())).await {
            drop(writer);
            error!(error = %e, %command, "websocket write failed");
            self.inner.fail().await;
            return Err(ProtocolError::Transport(e.to_string()));
        }
        trace!(%command, "sent");
        Ok(())
    }

    /// Send a command and wait for its reply, using the configured timeout.
    pub async fn invoke<T: FromInbound>(
        &self,
        content: impl Into<OutboundContent>,
    ) -> Result<T, ProtocolError> {
        self.invoke_with_timeout(content, self.inner.config.command_timeout)
            .await
    }

    /// Send a command and wait up to `timeout` for its reply.
    ///
    /// A timeout only abandons this call; the connection stays up.
    pub async fn invoke_with_timeout<T: FromInbound>(
        &self,
        content: impl Into<OutboundContent>,
        timeout: Duration,
    ) -> Result<T, ProtocolError> {
        let content = content.into();
        let command = content.command();
        let Some(expected) = command.expected_response() else {
            return Err(ProtocolError::NoResponse(command));
        };

        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let mut pending = PendingReply {
            callbacks: &self.inner.callbacks,
            tokens: Vec::new(),
        };
        let reply_tx = Arc::clone(&tx);
        let token = self.inner.callbacks.add_once(expected, move |payload| {
            if let Some(tx) = reply_tx.lock().take() {
                let _ = tx.send(payload.to_owned());
            }
        });
        pending.tokens.push((expected, token));
        // Failure tags are plain substrings, so another command's reply can
        // contain one. These handlers stay registered until the call ends and
        // only complete it for a payload that really is that failure.
        for &tag in command.failure_responses() {
            let tx = Arc::clone(&tx);
            let token = self.inner.callbacks.add(tag, move |payload| {
                if is_failure_reply(tag, payload) {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(payload.to_owned());
                    }
                }
            });
            pending.tokens.push((tag, token));
        }

        self.send(&content).await?;
        debug!(%command, %expected, "awaiting reply");

        let payload = tokio::select! {
            reply = rx => reply.map_err(|_| ProtocolError::Cancelled)?,
            () = self.inner.cancel.cancelled() => return Err(ProtocolError::Cancelled),
            () = tokio::time::sleep(timeout) => {
                warn!(%command, ?timeout, "command timed out");
                return Err(ProtocolError::Timeout { command, after: timeout });
            }
        };
        drop(pending);
        wire::expect_reply(payload.as_bytes())
    }

    /// Fetch the names of the windows and screens the server can capture.
    pub async fn capturable_list(&self) -> Result<Vec<String>, ProtocolError> {
        let list: CapturableList = self.invoke(Command::GetCapturableList).await?;
        debug!(count = list.capturables.len(), "received capturable list");
        Ok(list.capturables)
    }

    /// Apply a capture configuration.
    pub async fn configure(&self, config: CaptureConfig) -> Result<(), ProtocolError> {
        let capturable_id = config.capturable_id;
        let reply: String = self.invoke(config).await?;
        if matches!(reply.parse::<Response>(), Ok(Response::ConfigOk)) {
            info!(capturable_id, "capture configured");
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedResponse {
                expected: "ConfigOk",
                received: "string",
            })
        }
    }

    /// Request the next video frame. Not acknowledged.
    pub async fn try_get_frame(&self) -> Result<(), ProtocolError> {
        self.send(&Command::TryGetFrame.into()).await
    }

    pub async fn send_pointer_event(&self, event: PointerEvent) -> Result<(), ProtocolError> {
        self.send(&event.into()).await
    }

    pub async fn send_wheel_event(&self, event: WheelEvent) -> Result<(), ProtocolError> {
        self.send(&event.into()).await
    }

    pub async fn send_keyboard_event(&self, event: KeyboardEvent) -> Result<(), ProtocolError> {
        self.send(&event.into()).await
    }

    /// Ask the server to start streaming video.
    ///
    /// The session counts as confirmed once the server pushes `NewVideo`.
    /// Calling this again while a request is outstanding does nothing.
    pub async fn start_video(&self) -> Result<(), ProtocolError> {
        if self.inner.video_requested.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let confirmed = Arc::clone(&self.inner.video_confirmed);
        let token = self.inner.callbacks.add_once(Response::NewVideo, move |_| {
            confirmed.store(true, Ordering::Release);
            info!("video stream confirmed");
        });
        if let Err(e) = self.try_get_frame().await {
            self.inner.callbacks.remove(Response::NewVideo, token);
            self.inner.video_requested.store(false, Ordering::Release);
            return Err(e);
        }
        debug!("video requested");
        Ok(())
    }

    pub fn is_video_requested(&self) -> bool {
        self.inner.video_requested.load(Ordering::Acquire)
    }

    pub fn is_video_confirmed(&self) -> bool {
        self.inner.video_confirmed.load(Ordering::Acquire)
    }

    /// Cancel the client and send a normal-closure frame. Idempotent.
    pub async fn close(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == ClientState::Connected {
                *state = ClientState::ShuttingDown;
                true
            } else {
                false
            }
        });
        self.inner.cancel.cancel();
        self.inner.finish(true).await;
    }
}

fn is_failure_reply(tag: Response, payload: &str) -> bool {
    matches!(
        (tag, wire::parse(payload.as_bytes())),
        (Response::Error, Ok(Inbound::Error(_)))
            | (Response::ConfigError, Ok(Inbound::ConfigError(_)))
    )
}

async fn read_loop(inner: Arc<Inner>, mut reader: WsReader, queue: mpsc::Sender<Queued>) {
    loop {
        let message = tokio::select! {
            () = inner.cancel.cancelled() => {
                debug!("reader cancelled");
                inner.finish(true).await;
                return;
            }
            message = reader.next() => message,
        };
        let queued = match message {
            Some(Ok(Message::Text(text))) => {
                trace!(len = text.len(), "text message");
                Queued::Text(text)
            }
            Some(Ok(Message::Binary(data))) => {
                trace!(len = data.len(), "binary message");
                Queued::Binary(data)
            }
            Some(Ok(Message::Close(frame))) => {
                info!(?frame, "server closed the connection");
                inner.fail().await;
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                if !inner.cancel.is_cancelled() {
                    error!(error = %e, "websocket read failed");
                }
                inner.fail().await;
                return;
            }
            None => {
                warn!("websocket stream ended");
                inner.fail().await;
                return;
            }
        };
        if queue.send(queued).await.is_err() {
            debug!("dispatcher gone, reader stopping");
            return;
        }
    }
}

async fn dispatch_loop(
    inner: Arc<Inner>,
    mut queue: mpsc::Receiver<Queued>,
    mut sink: Option<Box<dyn BinarySink>>,
) {
    while let Some(message) = queue.recv().await {
        match message {
            Queued::Text(text) => {
                let handled = inner.callbacks.dispatch_matching(&text);
                if handled == 0 {
                    debug!(%text, "unhandled message");
                } else {
                    trace!(handled, "dispatched");
                }
            }
            Queued::Binary(data) => match sink.as_mut() {
                Some(sink) => {
                    if let Err(e) = sink.write_frame(&data).await {
                        warn!(error = %e, len = data.len(), "binary sink write failed");
                    }
                }
                None => trace!(len = data.len(), "no binary sink, message dropped"),
            },
        }
    }
    if let Some(mut sink) = sink {
        if let Err(e) = sink.finish().await {
            debug!(error = %e, "binary sink finish failed");
        }
    }
    debug!("dispatcher stopped");
}
