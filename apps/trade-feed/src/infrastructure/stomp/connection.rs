//! Connection Manager
//!
//! Owns the single STOMP-over-WebSocket session and drives the connection
//! lifecycle through it.
//!
//! # Retry Regimes
//!
//! - **Transport faults** (connect failure, handshake timeout, heart-beat
//!   timeout, remote close, socket errors) retry after a fixed delay, forever.
//! - **Protocol faults** (`ERROR` frame from the broker) retry after the same
//!   delay until the lifecycle's attempt bound is reached, then stop in
//!   FAILED until `connect()` is called again.
//!
//! # Ordering
//!
//! State transitions and event dispatch are serialized by one re-entrant
//! delivery lock. Listeners observe transitions in order, may call back into
//! the manager, and never run while the lifecycle lock is held. Once
//! `disconnect()` returns, the torn-down session applies no transition and
//! dispatches no event.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::frame::{Command, Frame, HEARTBEAT, Inbound, StompCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::retry::{RetryConfig, RetryPolicy};
use crate::domain::connection::{
    ConnectionLifecycle, ConnectionState, DEFAULT_MAX_ATTEMPTS, Transitions,
};
use crate::domain::subscription::{
    SubscriptionRegistry, Topic, TopicTransport, Unsubscribe, destination_for,
};
use crate::domain::trade::{TradeEvent, decode_trade};
use crate::infrastructure::metrics::{self, TransportFaultKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Callback receiving every connection state the manager enters.
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

// =============================================================================
// Error Type
// =============================================================================

/// Why a session ended. Selects the retry regime.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Socket-level failure; retried without bound.
    #[error("transport fault ({}): {message}", kind.as_str())]
    Transport {
        /// Fault classification.
        kind: TransportFaultKind,
        /// Detail for logs.
        message: String,
    },

    /// The broker sent `ERROR`; retried up to the attempt bound.
    #[error("protocol fault: {0}")]
    Protocol(String),
}

impl SessionError {
    fn transport(kind: TransportFaultKind, message: impl fmt::Display) -> Self {
        Self::Transport {
            kind,
            message: message.to_string(),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// STOMP `host` header. Defaults to the host of `url`.
    pub host: Option<String>,
    /// STOMP `login` header.
    pub login: Option<String>,
    /// STOMP `passcode` header.
    pub passcode: Option<String>,
    /// Requested heart-beat intervals.
    pub heartbeat: HeartbeatConfig,
    /// Delay between attempts.
    pub retry: RetryConfig,
    /// Consecutive protocol faults before FAILED.
    pub max_attempts: u32,
    /// Limit on WebSocket connect and on waiting for `CONNECTED`.
    pub handshake_timeout: Duration,
}

impl ConnectionConfig {
    /// Defaults for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            host: None,
            login: None,
            passcode: None,
            heartbeat: HeartbeatConfig::default(),
            retry: RetryConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Host sent in `CONNECT`.
    #[must_use]
    pub fn stomp_host(&self) -> String {
        self.host.clone().unwrap_or_else(|| {
            reqwest::Url::parse(&self.url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .unwrap_or_else(|| "localhost".to_string())
        })
    }

    fn connect_frame(&self) -> Frame {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2,1.1")
            .header("host", self.stomp_host())
            .header("heart-beat", self.heartbeat.header_value());
        if let Some(login) = &self.login {
            frame = frame.header("login", login.as_str());
        }
        if let Some(passcode) = &self.passcode {
            frame = frame.header("passcode", passcode.as_str());
        }
        frame
    }
}

// =============================================================================
// Session Link
// =============================================================================

enum SessionCommand {
    Reconcile(Topic),
}

/// Forwards registry topic changes to whichever session is current.
#[derive(Default)]
struct SessionLink {
    commands: Mutex<Option<mpsc::UnboundedSender<SessionCommand>>>,
}

impl SessionLink {
    fn attach(&self, commands: mpsc::UnboundedSender<SessionCommand>) {
        *self.commands.lock() = Some(commands);
    }

    fn detach(&self) {
        *self.commands.lock() = None;
    }

    fn reconcile(&self, topic: &str) {
        if let Some(commands) = self.commands.lock().as_ref() {
            let _ = commands.send(SessionCommand::Reconcile(topic.to_string()));
        }
    }
}

impl TopicTransport for SessionLink {
    fn topic_opened(&self, topic: &str) {
        self.reconcile(topic);
    }

    fn topic_closed(&self, topic: &str) {
        self.reconcile(topic);
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
}

/// Owner of the push transport.
///
/// Create with [`ConnectionManager::new`]; subscribe through
/// [`ConnectionManager::registry`]; start with
/// [`ConnectionManager::connect`].
pub struct ConnectionManager {
    config: ConnectionConfig,
    registry: Arc<SubscriptionRegistry>,
    link: Arc<SessionLink>,
    lifecycle: Mutex<ConnectionLifecycle>,
    session: Mutex<Option<SessionHandle>>,
    listeners: RwLock<BTreeMap<u64, StateListener>>,
    next_listener: AtomicU64,
    delivery: ReentrantMutex<()>,
}

impl ConnectionManager {
    /// Create a disconnected manager with its own subscription registry.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        let link = Arc::new(SessionLink::default());
        let transport: Arc<dyn TopicTransport> = Arc::clone(&link) as Arc<dyn TopicTransport>;
        let lifecycle = ConnectionLifecycle::new(config.max_attempts);

        Arc::new(Self {
            registry: Arc::new(SubscriptionRegistry::new(transport)),
            link,
            lifecycle: Mutex::new(lifecycle),
            session: Mutex::new(None),
            listeners: RwLock::new(BTreeMap::new()),
            next_listener: AtomicU64::new(0),
            delivery: ReentrantMutex::new(()),
            config,
        })
    }

    /// Registry whose topics this manager keeps subscribed.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.lock().state()
    }

    /// Consecutive protocol faults so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.lifecycle.lock().attempts()
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Start a session.
    ///
    /// No-op while CONNECTING or CONNECTED. From FAILED the attempt counter is
    /// reset. Must be called inside a tokio runtime.
    pub fn connect(self: &Arc<Self>) {
        let _delivery = self.delivery.lock();
        let transitions = {
            let mut lifecycle = self.lifecycle.lock();
            let transitions = lifecycle.connect();
            if transitions.is_empty() {
                return;
            }
            self.spawn_session();
            transitions
        };
        self.deliver(&transitions);
    }

    /// Tear down the session and report DISCONNECTED.
    ///
    /// A best-effort `DISCONNECT` frame is sent by the closing session.
    pub fn disconnect(&self) {
        let _delivery = self.delivery.lock();
        let transitions = {
            let mut lifecycle = self.lifecycle.lock();
            if let Some(session) = self.session.lock().take() {
                tracing::debug!(session = %session.id, "Cancelling session");
                session.cancel.cancel();
            }
            self.link.detach();
            lifecycle.disconnect()
        };
        tracing::info!("Disconnected by request");
        self.deliver(&transitions);
    }

    /// Register a state listener. It is called at once with the current
    /// state, then on every transition.
    pub fn on_state_change<F>(self: &Arc<Self>, listener: F) -> Unsubscribe
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let _delivery = self.delivery.lock();
        let listener: StateListener = Arc::new(listener);
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, Arc::clone(&listener));

        listener(self.state());

        let manager: Weak<Self> = Arc::downgrade(self);
        Unsubscribe::new(move || {
            if let Some(manager) = manager.upgrade() {
                manager.listeners.write().remove(&id);
            }
        })
    }

    /// Boolean projection of [`ConnectionManager::on_state_change`].
    pub fn on_connection_change<F>(self: &Arc<Self>, listener: F) -> Unsubscribe
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_state_change(move |state| listener(state.is_connected()))
    }

    fn spawn_session(self: &Arc<Self>) {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.link.attach(commands_tx);

        let previous = self.session.lock().replace(SessionHandle {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let session = Session {
            manager: Arc::clone(self),
            cancel,
            commands: commands_rx,
            codec: StompCodec::new(),
            retry: RetryPolicy::new(self.config.retry),
            next_subscription: 0,
        };
        let span = tracing::info_span!("stomp_session", session = %id);
        tokio::spawn(session.run().instrument(span));
    }

    /// Apply a lifecycle input on behalf of a session.
    ///
    /// Returns `None` when the session was cancelled, otherwise whether it
    /// should keep retrying.
    fn apply(
        &self,
        cancel: &CancellationToken,
        input: impl FnOnce(&mut ConnectionLifecycle) -> Transitions,
    ) -> Option<bool> {
        let _delivery = self.delivery.lock();
        let (transitions, retry) = {
            let mut lifecycle = self.lifecycle.lock();
            if cancel.is_cancelled() {
                return None;
            }
            let transitions = input(&mut lifecycle);
            (transitions, lifecycle.should_retry())
        };
        self.deliver(&transitions);
        Some(retry)
    }

    /// Dispatch one decoded event unless the session was cancelled.
    fn dispatch(&self, cancel: &CancellationToken, topic: &str, event: &TradeEvent) -> Option<usize> {
        let _delivery = self.delivery.lock();
        if cancel.is_cancelled() {
            return None;
        }
        Some(self.registry.dispatch(topic, event))
    }

    fn deliver(&self, transitions: &[ConnectionState]) {
        for &state in transitions {
            metrics::set_connection_state(state);
            tracing::info!(state = %state, "Connection state changed");

            let listeners: Vec<StateListener> = self.listeners.read().values().cloned().collect();
            for listener in listeners {
                listener(state);
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Session
// =============================================================================

/// Live STOMP subscriptions of one connected session.
#[derive(Default)]
struct LiveSubscriptions {
    by_topic: HashMap<Topic, String>,
    by_id: HashMap<String, Topic>,
}

/// One chain of connection attempts. Ends on cancel or FAILED.
struct Session {
    manager: Arc<ConnectionManager>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    codec: StompCodec,
    retry: RetryPolicy,
    next_subscription: u64,
}

impl Session {
    async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let fault = match self.connect_and_run().await {
                Ok(()) => return,
                Err(fault) => fault,
            };

            let retry = match &fault {
                SessionError::Transport { kind, message } => {
                    metrics::record_transport_fault(*kind);
                    tracing::warn!(kind = kind.as_str(), error = %message, "Transport fault");
                    self.manager
                        .apply(&self.cancel, ConnectionLifecycle::transport_fault)
                }
                SessionError::Protocol(message) => {
                    metrics::record_protocol_fault();
                    tracing::warn!(error = %message, "Protocol fault");
                    self.manager
                        .apply(&self.cancel, ConnectionLifecycle::protocol_fault)
                }
            };
            match retry {
                None => return,
                Some(false) => {
                    tracing::error!(
                        attempts = self.manager.attempts(),
                        "Reconnect attempts exhausted"
                    );
                    return;
                }
                Some(true) => {}
            }

            let delay = self.retry.next_delay();
            metrics::record_reconnect_attempt();
            tracing::info!(
                attempt = self.retry.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to STOMP endpoint"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if self
                .manager
                .apply(&self.cancel, ConnectionLifecycle::transport_retry)
                .is_none()
            {
                return;
            }
        }
    }

    /// Connect, handshake and pump frames until a fault or cancellation.
    async fn connect_and_run(&mut self) -> Result<(), SessionError> {
        let config = self.manager.config().clone();
        tracing::info!(url = %config.url, "Connecting to STOMP endpoint");

        let connecting = tokio::time::timeout(
            config.handshake_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        );
        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connecting => match result {
                Err(_) => {
                    return Err(SessionError::transport(
                        TransportFaultKind::HandshakeTimeout,
                        "WebSocket connect timed out",
                    ));
                }
                Ok(Err(e)) => return Err(SessionError::transport(TransportFaultKind::Connect, e)),
                Ok(Ok((ws_stream, _response))) => ws_stream,
            },
        };
        let (mut write, mut read) = ws_stream.split();

        self.send_frame(&mut write, &config.connect_frame()).await?;
        let Some(connected) = self.await_connected(&mut read, config.handshake_timeout).await?
        else {
            let _ = write.close().await;
            return Ok(());
        };

        if self
            .manager
            .apply(&self.cancel, ConnectionLifecycle::handshake_succeeded)
            .is_none()
        {
            let _ = write.close().await;
            return Ok(());
        }
        self.retry.reset();

        let heartbeats = config.heartbeat.negotiate(connected.get("heart-beat"));
        tracing::info!(
            version = connected.get("version").unwrap_or("1.0"),
            server = connected.get("server").unwrap_or("unknown"),
            heartbeats = ?heartbeats,
            "STOMP session established"
        );

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                heartbeats,
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        let mut live = LiveSubscriptions::default();
        for topic in self.manager.registry().active_topics() {
            self.reconcile(&mut write, &mut live, &topic).await?;
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write
                        .send(Message::Text(self.codec.encode(&Frame::disconnect()).into()))
                        .await;
                    let _ = write.close().await;
                    return Ok(());
                }
                Some(event) = heartbeat_rx.recv() => match event {
                    HeartbeatEvent::SendBeat => {
                        tracing::trace!("Sending heart-beat");
                        write
                            .send(Message::Text(HEARTBEAT.into()))
                            .await
                            .map_err(|e| SessionError::transport(TransportFaultKind::Io, e))?;
                    }
                    HeartbeatEvent::Timeout => {
                        return Err(SessionError::transport(
                            TransportFaultKind::HeartbeatTimeout,
                            "no inbound traffic within heart-beat window",
                        ));
                    }
                },
                Some(command) = self.commands.recv() => match command {
                    SessionCommand::Reconcile(topic) => {
                        self.reconcile(&mut write, &mut live, &topic).await?;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat_state.record_received();
                        self.handle_text(text.as_str(), &live)?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        heartbeat_state.record_received();
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| SessionError::transport(TransportFaultKind::Io, e))?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Broker sent close frame");
                        return Err(SessionError::transport(
                            TransportFaultKind::RemoteClose,
                            "broker closed the connection",
                        ));
                    }
                    Some(Ok(_)) => heartbeat_state.record_received(),
                    Some(Err(e)) => return Err(SessionError::transport(TransportFaultKind::Io, e)),
                    None => {
                        return Err(SessionError::transport(
                            TransportFaultKind::RemoteClose,
                            "WebSocket stream ended",
                        ));
                    }
                },
            }
        }
    }

    /// Wait for `CONNECTED`. `Ok(None)` means the session was cancelled.
    async fn await_connected(
        &self,
        read: &mut WsSource,
        timeout: Duration,
    ) -> Result<Option<Frame>, SessionError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let msg = tokio::select! {
                () = self.cancel.cancelled() => return Ok(None),
                () = &mut deadline => {
                    return Err(SessionError::transport(
                        TransportFaultKind::HandshakeTimeout,
                        "no CONNECTED frame before the deadline",
                    ));
                }
                msg = read.next() => msg,
            };

            let text = match msg {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SessionError::transport(
                        TransportFaultKind::RemoteClose,
                        "closed during handshake",
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SessionError::transport(TransportFaultKind::Io, e)),
            };

            for inbound in self.decode(text.as_str())? {
                let Inbound::Frame(frame) = inbound else {
                    continue;
                };
                match frame.command() {
                    Command::Connected => return Ok(Some(frame)),
                    Command::Error => return Err(SessionError::Protocol(error_message(&frame))),
                    other => tracing::debug!(command = %other, "Ignoring frame before CONNECTED"),
                }
            }
        }
    }

    fn handle_text(&self, text: &str, live: &LiveSubscriptions) -> Result<(), SessionError> {
        for inbound in self.codec.frames(text) {
            let frame = match inbound {
                Ok(Inbound::Heartbeat) => {
                    tracing::trace!("Heart-beat received");
                    continue;
                }
                Ok(Inbound::Frame(frame)) => frame,
                Err(e) => {
                    metrics::record_decode_failure();
                    tracing::warn!(error = %e, "Dropping malformed frame");
                    continue;
                }
            };

            match frame.command() {
                Command::Message => self.handle_message(&frame, live),
                Command::Error => return Err(SessionError::Protocol(error_message(&frame))),
                Command::Receipt => {
                    tracing::debug!(receipt = frame.get("receipt-id"), "Receipt received");
                }
                other => tracing::debug!(command = %other, "Ignoring unexpected frame"),
            }
        }
        Ok(())
    }

    fn handle_message(&self, frame: &Frame, live: &LiveSubscriptions) {
        metrics::record_frame_received();

        let topic = frame
            .get("subscription")
            .and_then(|id| live.by_id.get(id).cloned())
            .or_else(|| {
                frame
                    .get("destination")
                    .and_then(|destination| self.manager.registry().topic_for_destination(destination))
            });
        let Some(topic) = topic else {
            tracing::debug!(
                destination = frame.get("destination"),
                subscription = frame.get("subscription"),
                "Message for unknown subscription dropped"
            );
            return;
        };

        let event = match decode_trade(frame.body()) {
            Ok(event) => event,
            Err(e) => {
                metrics::record_decode_failure();
                tracing::warn!(
                    topic = %topic,
                    reason = %e.reason(),
                    body = %e.preview(),
                    "Dropping undecodable event"
                );
                return;
            }
        };

        tracing::trace!(topic = %topic, id = %event.id(), ticker = %event.ticker(), "Event received");
        if let Some(delivered) = self.manager.dispatch(&self.cancel, &topic, &event) {
            metrics::record_events_dispatched(&topic, u64::try_from(delivered).unwrap_or(u64::MAX));
        }
    }

    /// Bring the STOMP subscription for `topic` in line with the registry.
    async fn reconcile(
        &mut self,
        write: &mut WsSink,
        live: &mut LiveSubscriptions,
        topic: &str,
    ) -> Result<(), SessionError> {
        let wanted = self.manager.registry().is_active(topic);
        let current = live.by_topic.get(topic).cloned();

        match (wanted, current) {
            (true, None) => {
                let id = format!("sub-{}", self.next_subscription);
                self.next_subscription += 1;
                let destination = destination_for(topic);
                tracing::info!(topic = %topic, id = %id, destination = %destination, "Subscribing");
                self.send_frame(write, &Frame::subscribe(&id, &destination))
                    .await?;
                live.by_id.insert(id.clone(), topic.to_string());
                live.by_topic.insert(topic.to_string(), id);
            }
            (false, Some(id)) => {
                tracing::info!(topic = %topic, id = %id, "Unsubscribing");
                self.send_frame(write, &Frame::unsubscribe(&id)).await?;
                live.by_topic.remove(topic);
                live.by_id.remove(&id);
            }
            _ => {}
        }

        metrics::set_active_topics(live.by_topic.len());
        Ok(())
    }

    async fn send_frame(&self, write: &mut WsSink, frame: &Frame) -> Result<(), SessionError> {
        tracing::trace!(command = %frame.command(), "Sending frame");
        write
            .send(Message::Text(self.codec.encode(frame).into()))
            .await
            .map_err(|e| SessionError::transport(TransportFaultKind::Io, e))
    }

    /// Strict decode for the handshake, where a bad frame ends the attempt.
    fn decode(&self, text: &str) -> Result<Vec<Inbound>, SessionError> {
        self.codec
            .decode(text)
            .map_err(|e| SessionError::transport(TransportFaultKind::Framing, e))
    }
}

fn error_message(frame: &Frame) -> String {
    frame
        .get("message")
        .map_or_else(|| frame.body().trim().to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ConnectionConfig {
        let mut config = ConnectionConfig::new("ws://127.0.0.1:1/ws");
        config.retry = RetryConfig::fixed(Duration::from_millis(20));
        config
    }

    fn recorder(manager: &Arc<ConnectionManager>) -> (Arc<Mutex<Vec<ConnectionState>>>, Unsubscribe) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = manager.on_state_change(move |state| sink.lock().push(state));
        (seen, handle)
    }

    #[test]
    fn stomp_host_defaults_to_url_host() {
        let config = ConnectionConfig::new("wss://broker.example.com:8443/ws/websocket");
        assert_eq!(config.stomp_host(), "broker.example.com");

        let mut config = config;
        config.host = Some("vhost".to_string());
        assert_eq!(config.stomp_host(), "vhost");
    }

    #[test]
    fn connect_frame_carries_credentials_and_heartbeat() {
        let mut config = ConnectionConfig::new("ws://localhost:8080/ws/websocket");
        config.login = Some("guest".to_string());
        config.passcode = Some("secret".to_string());

        let frame = config.connect_frame();
        assert_eq!(frame.command(), Command::Connect);
        assert_eq!(frame.get("accept-version"), Some("1.2,1.1"));
        assert_eq!(frame.get("host"), Some("localhost"));
        assert_eq!(frame.get("heart-beat"), Some("4000,4000"));
        assert_eq!(frame.get("login"), Some("guest"));
        assert_eq!(frame.get("passcode"), Some("secret"));
    }

    #[test]
    fn listener_sees_current_state_immediately() {
        let manager = ConnectionManager::new(unreachable_config());
        let (seen, _handle) = recorder(&manager);
        assert_eq!(*seen.lock(), vec![ConnectionState::Disconnected]);
    }

    #[tokio::test]
    async fn transport_faults_keep_connecting_until_disconnect() {
        let manager = ConnectionManager::new(unreachable_config());
        let (seen, _handle) = recorder(&manager);

        manager.connect();
        manager.connect();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.attempts(), 0);

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn boolean_projection() {
        let manager = ConnectionManager::new(unreachable_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _handle = manager.on_connection_change(move |connected| sink.lock().push(connected));

        manager.connect();
        manager.disconnect();
        assert_eq!(*seen.lock(), vec![false, false, false]);
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_not_called() {
        let manager = ConnectionManager::new(unreachable_config());
        let (seen, handle) = recorder(&manager);
        handle.unsubscribe();

        manager.connect();
        manager.disconnect();
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn listener_may_call_back_into_manager() {
        let manager = ConnectionManager::new(unreachable_config());
        let weak = Arc::downgrade(&manager);
        let _handle = manager.on_state_change(move |state| {
            if state == ConnectionState::Connecting {
                if let Some(manager) = weak.upgrade() {
                    manager.disconnect();
                }
            }
        });

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
