//! The WebSocket session with the host.
//!
//! One [`Connection`] is one session: it registers, runs a receive loop that
//! decodes frames and fans recognized events out to listeners, and funnels
//! every outbound command through a single writer task. A session that ends
//! (cleanly or not) is never reopened; build a new `Connection` instead.
//!
//! Listeners are called synchronously on the receive loop and must hand any
//! real work off (the router does this through the
//! [`Dispatcher`](crate::Dispatcher)), so a slow handler never delays the
//! next frame.

mod state;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use keydeck_core::RegistrationParameters;
use keydeck_protocol::{Command, Decoded, InboundEvent, decode, encode, encode_registration};
use keydeck_settings::ConnectionSettings;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::errors::ConnectionError;
use crate::sink::CommandSink;

pub use state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Receives every recognized inbound event, in arrival order.
///
/// Runs on the receive loop: implementations must return quickly and must
/// not await anything.
pub trait EventListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &InboundEvent);
}

impl<F> EventListener for F
where
    F: Fn(&InboundEvent) + Send + Sync,
{
    fn on_event(&self, event: &InboundEvent) {
        self(event);
    }
}

enum Outbound {
    Frame {
        text: String,
        ack: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

struct Inner {
    params: RegistrationParameters,
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    writer: Mutex<Option<mpsc::Sender<Outbound>>>,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    events: broadcast::Sender<InboundEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            debug!(%from, to = %next, "connection state changed");
        }
        changed
    }

    fn fault(&self, reason: &str) {
        if self.transition(ConnectionState::Faulted) {
            warn!(reason, "connection faulted");
        }
        drop(self.writer.lock().take());
    }

    fn handle_frame(&self, text: &str) {
        match decode(text) {
            Ok(Decoded::Event(event)) => {
                trace!(
                    event = %event.kind,
                    context = event.context.as_ref().map_or("", |c| c.as_str()),
                    "event received"
                );
                let listeners = self.listeners.read().clone();
                for listener in &listeners {
                    listener.on_event(&event);
                }
                // no subscribers is fine
                let _ = self.events.send(event);
            }
            Ok(Decoded::Unrecognized(name)) => {
                debug!(event = %name, "ignoring unrecognized event");
            }
            Err(e) => {
                warn!(error = %e, "discarding undecodable frame");
            }
        }
    }
}

/// A single WebSocket session with the host.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create an idle session for the given startup parameters.
    pub fn new(params: RegistrationParameters, settings: ConnectionSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                params,
                settings,
                state,
                writer: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.current()
    }

    /// The parameters this session registers with.
    pub fn params(&self) -> &RegistrationParameters {
        &self.inner.params
    }

    /// `ws://{host}:{port}/`.
    pub fn url(&self) -> String {
        format!(
            "ws://{}:{}/",
            self.inner.settings.host, self.inner.params.port
        )
    }

    /// Register a listener. Listeners added after `connect()` only see
    /// events that arrive after they were added.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Receive every recognized event on a broadcast channel.
    ///
    /// A subscriber that falls behind loses the oldest events
    /// (`RecvError::Lagged`); the receive loop is never held up.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events.subscribe()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open the socket, send the registration frame and start the
    /// receive loop and writer.
    ///
    /// The registration frame is always the first frame on the wire.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.inner.params.validate()?;
        if !self.inner.transition(ConnectionState::Connecting) {
            return Err(ConnectionError::AlreadyStarted(self.state()));
        }
        if let Err(e) = self.open().await {
            self.inner.fault("connect failed");
            return Err(e);
        }
        Ok(())
    }

    async fn open(&self) -> Result<(), ConnectionError> {
        let url = self.url();
        let timeout = self.inner.settings.connect_timeout();
        info!(%url, "connecting to host");

        let (ws, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(timeout))??;
        let (mut sink, source) = ws.split();

        let params = &self.inner.params;
        let registration = encode_registration(&params.register_event, &params.plugin_uuid)?;
        sink.send(Message::Text(registration.into())).await?;

        let (tx, rx) = mpsc::channel(self.inner.settings.send_queue_capacity.max(1));
        *self.inner.writer.lock() = Some(tx);

        if !self.inner.transition(ConnectionState::Open) {
            return Err(ConnectionError::NotOpen(self.state()));
        }
        info!(plugin_uuid = %params.plugin_uuid, "registered with host");

        let writer = tokio::spawn(write_loop(Arc::clone(&self.inner), sink, rx));
        let reader = tokio::spawn(read_loop(Arc::clone(&self.inner), source));
        self.inner.tasks.lock().extend([writer, reader]);
        Ok(())
    }

    /// Encode and write one command.
    ///
    /// Writes go through a single writer task; concurrent callers queue in
    /// FIFO order and each waits until its own frame has been written.
    pub async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ConnectionError::NotOpen(state));
        }
        let text = encode(&command)?;
        let writer = self
            .inner
            .writer
            .lock()
            .clone()
            .ok_or_else(|| ConnectionError::NotOpen(self.state()))?;

        trace!(command = %command.kind(), "sending command");
        let (ack, done) = oneshot::channel();
        writer
            .send(Outbound::Frame { text, ack })
            .await
            .map_err(|_| ConnectionError::WriterClosed)?;
        done.await.map_err(|_| ConnectionError::WriterClosed)?
    }

    /// Close the session: refuse new sends, flush queued frames, perform the
    /// close handshake within the configured timeout, then mark `Closed`.
    ///
    /// Idempotent once the session is terminal.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let state = self.state();
        match state {
            ConnectionState::Closed | ConnectionState::Faulted => return Ok(()),
            ConnectionState::Idle => {
                let _ = self.inner.transition(ConnectionState::Closed);
                return Ok(());
            }
            ConnectionState::Connecting | ConnectionState::Closing => {
                return Err(ConnectionError::NotOpen(state));
            }
            ConnectionState::Open => {}
        }
        if !self.inner.transition(ConnectionState::Closing) {
            return Ok(());
        }
        info!("disconnecting from host");

        let writer = self.inner.writer.lock().take();
        let handles = std::mem::take(&mut *self.inner.tasks.lock());
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        let close = async move {
            if let Some(writer) = writer {
                let (ack, done) = oneshot::channel();
                if writer.send(Outbound::Close { ack }).await.is_ok() {
                    let _ = done.await;
                }
            }
            let _ = futures::future::join_all(handles).await;
        };

        let timeout = self.inner.settings.close_timeout();
        if tokio::time::timeout(timeout, close).await.is_err() {
            warn!(?timeout, "close handshake timed out, aborting session tasks");
            for abort in aborts {
                abort.abort();
            }
        }

        let _ = self.inner.transition(ConnectionState::Closed);
        Ok(())
    }

    /// Resolve once the session reaches `Closed` or `Faulted`.
    pub async fn wait_terminal(&self) -> ConnectionState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

#[async_trait]
impl CommandSink for Connection {
    async fn send(&self, command: Command) -> Result<(), ConnectionError> {
        Connection::send(self, command).await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn write_loop(inner: Arc<Inner>, mut sink: WsSink, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame { text, ack } => {
                let result = sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(ConnectionError::from);
                let failed = result.is_err();
                if let Err(e) = &result {
                    warn!(error = %e, "write failed");
                }
                let _ = ack.send(result);
                if failed {
                    inner.fault("write failed");
                    return;
                }
            }
            Outbound::Close { ack } => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "close frame not sent");
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

async fn read_loop(inner: Arc<Inner>, mut source: WsSource) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => inner.handle_frame(text.as_str()),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => inner.handle_frame(text),
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "close frame received");
                if inner.current() == ConnectionState::Open {
                    info!("host closed the connection");
                    drop(inner.writer.lock().take());
                }
                let _ = inner.transition(ConnectionState::Closed);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if inner.current() == ConnectionState::Open {
                    warn!(error = %e, "transport error");
                    inner.fault("transport error");
                } else {
                    debug!(error = %e, "transport error while closing");
                }
                return;
            }
        }
    }
    if inner.current() == ConnectionState::Open {
        inner.fault("transport dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use keydeck_protocol::EventKind;

    fn params(port: u16) -> RegistrationParameters {
        RegistrationParameters::new(port, "ABCDEF123456", "registerPlugin", serde_json::json!({}))
            .unwrap()
    }

    fn local_settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "127.0.0.1".into(),
            connect_timeout_ms: 1_000,
            ..ConnectionSettings::default()
        }
    }

    #[tokio::test]
    async fn send_before_connect_is_refused() {
        let conn = Connection::new(params(28196), local_settings());
        let err = conn.send(Command::log("hello")).await.unwrap_err();
        assert_matches!(err, ConnectionError::NotOpen(ConnectionState::Idle));
        assert!(err.is_misuse());
    }

    #[test]
    fn url_uses_host_and_port() {
        let conn = Connection::new(params(28196), ConnectionSettings::default());
        assert_eq!(conn.url(), "ws://localhost:28196/");
    }

    #[tokio::test]
    async fn disconnect_idle_closes() {
        let conn = Connection::new(params(28196), local_settings());
        conn.disconnect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.wait_terminal().await, ConnectionState::Closed);
        // second call is a no-op
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_faults() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let conn = Connection::new(params(port), local_settings());
        let err = conn.connect().await.unwrap_err();
        assert_matches!(err, ConnectionError::Transport(_) | ConnectionError::ConnectTimeout(_));
        assert_eq!(conn.state(), ConnectionState::Faulted);

        let err = conn.connect().await.unwrap_err();
        assert_matches!(err, ConnectionError::AlreadyStarted(ConnectionState::Faulted));
    }

    #[test]
    fn listeners_see_decoded_events_and_skip_garbage() {
        let conn = Connection::new(params(28196), local_settings());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        conn.add_listener(Arc::new(move |event: &InboundEvent| {
            sink.lock().push(event.kind);
        }));
        let mut rx = conn.subscribe();

        conn.inner.handle_frame(r#"{"event":"systemDidWakeUp"}"#);
        conn.inner.handle_frame("{not json");
        conn.inner.handle_frame(r#"{"event":"somethingNew"}"#);
        conn.inner
            .handle_frame(r#"{"event":"keyDown","context":"c1","action":"a","payload":{}}"#);

        assert_eq!(
            *seen.lock(),
            vec![EventKind::SystemDidWakeUp, EventKind::KeyDown]
        );
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::SystemDidWakeUp);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::KeyDown);
    }
}
