#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use strum_macros::Display;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use super::config::{ConnectionOptions, ReconnectPolicy};
use super::error::{DecodeError, WsError};
use super::registry::{Routable, Selector, SubscriberRegistry, Unsubscribe};
use super::traits::{Frame, FrameSink, FrameStream, MessageParser, Transport};
use super::transport::WebSocketTransport;
use crate::Result;
use crate::error::Error;

/// Upper bound for the close handshake when a session is cancelled.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected, and not trying to be
    Disconnected,
    /// An attempt to open the transport is in flight
    Connecting,
    /// The transport is open
    Connected,
    /// Waiting out the backoff delay before the next attempt
    Reconnecting,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Routable for ConnectionState {
    type Key = Self;

    fn route_key(&self) -> Self {
        *self
    }
}

/// Mutable per-manager bookkeeping, guarded by one lock.
///
/// `generation` is bumped by every fresh `connect()` and by `disconnect()`. A background task
/// only applies a transition while the generation it was started with is still current, so a
/// superseded task can never overwrite the state chosen by a newer call.
#[derive(Default)]
struct Session {
    generation: u64,
    attempts: u32,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    last_error: Option<Arc<Error>>,
}

/// Applied transitions not yet delivered to state listeners.
///
/// States are queued while the session lock is held, so the queue order is the order in which
/// they were applied. Only one caller delivers at a time. A caller that finds delivery already
/// in progress, including a listener re-entering the manager, leaves its state to that caller.
#[derive(Default)]
struct Notifications {
    pending: VecDeque<ConnectionState>,
    delivering: bool,
}

struct Inner<M: Routable, P, T> {
    options: ConnectionOptions,
    endpoint: Url,
    policy: ReconnectPolicy,
    parser: P,
    transport: T,
    messages: SubscriberRegistry<M>,
    states: SubscriberRegistry<ConnectionState>,
    decode_errors: SubscriberRegistry<DecodeError>,
    state_tx: watch::Sender<ConnectionState>,
    session: Mutex<Session>,
    notifications: Mutex<Notifications>,
    /// Frames re-sent on every successful open, keyed by the intent they express
    replay: DashMap<String, String>,
    /// Parent of every session token, cancelled when the last handle is dropped
    lifetime: CancellationToken,
}

/// Manages the lifecycle of one logical connection: opening, automatic reconnection with
/// exponential backoff, decoding inbound frames and fanning them out to handlers.
///
/// Every handle shares the same connection. The background task is cancelled when
/// [`ConnectionManager::disconnect`] is called or when the last handle is dropped.
///
/// # Type Parameters
///
/// - `M`: Message type routed to handlers by its [`Routable::route_key`]
/// - `P`: Parser type that implements [`MessageParser<M>`]
/// - `T`: The [`Transport`] used to open connections
pub struct ConnectionManager<M, P, T = WebSocketTransport>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
    T: Transport,
{
    inner: Arc<Inner<M, P, T>>,
    guard: Arc<DropGuard>,
}

impl<M, P, T> Clone for ConnectionManager<M, P, T>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
    T: Transport,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<M, P> ConnectionManager<M, P, WebSocketTransport>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
{
    /// Create a manager speaking WebSocket. Nothing is opened until [`Self::connect`].
    pub fn new(options: ConnectionOptions, parser: P) -> Result<Self> {
        Self::with_transport(options, parser, WebSocketTransport)
    }
}

impl<M, P, T> ConnectionManager<M, P, T>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
    T: Transport,
{
    /// Create a manager over a custom transport. The endpoint is validated eagerly.
    pub fn with_transport(options: ConnectionOptions, parser: P, transport: T) -> Result<Self> {
        let endpoint = options.endpoint_url()?;
        let policy = ReconnectPolicy::new(options.reconnect.clone());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let lifetime = CancellationToken::new();

        let inner = Inner {
            options,
            endpoint,
            policy,
            parser,
            transport,
            messages: SubscriberRegistry::new(),
            states: SubscriberRegistry::new(),
            decode_errors: SubscriberRegistry::new(),
            state_tx,
            session: Mutex::new(Session::default()),
            notifications: Mutex::new(Notifications::default()),
            replay: DashMap::new(),
            lifetime: lifetime.clone(),
        };

        Ok(Self {
            inner: Arc::new(inner),
            guard: Arc::new(lifetime.drop_guard()),
        })
    }

    /// Open the connection and resolve with the outcome of the first attempt.
    ///
    /// When already connecting or connected this starts nothing and waits for the pending
    /// outcome. When waiting out a reconnect delay, the delay is skipped and a fresh attempt
    /// starts with the attempt counter reset. A failed first attempt still leaves the
    /// reconnection loop running according to the policy.
    pub async fn connect(&self) -> Result<()> {
        let mut states = self.inner.state_tx.subscribe();
        self.start();

        let state = *states
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;

        if state.is_connected() {
            return Ok(());
        }

        let last_error = self.inner.lock().last_error.clone();
        match last_error {
            Some(error) => Err(Error::shared(&error)),
            None => Err(WsError::ConnectionClosed.into()),
        }
    }

    fn start(&self) {
        let (generation, token) = {
            let mut session = self.inner.lock();
            if matches!(
                *self.inner.state_tx.borrow(),
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                return;
            }

            if let Some(previous) = session.cancel.take() {
                previous.cancel();
            }
            session.generation = session.generation.wrapping_add(1);
            session.attempts = 0;
            session.last_error = None;
            session.outbound = None;

            let token = self.inner.lifetime.child_token();
            session.cancel = Some(token.clone());
            self.inner.apply(ConnectionState::Connecting);

            (session.generation, token)
        };

        self.inner.deliver();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(generation, token).await;
        });
    }

    /// Close the connection and stop reconnecting. Valid in every state; a pending reconnect
    /// delay is cancelled and no later attempt is made until the next [`Self::connect`].
    ///
    /// Remembered replay frames are forgotten.
    pub fn disconnect(&self) {
        {
            let mut session = self.inner.lock();
            session.generation = session.generation.wrapping_add(1);
            if let Some(token) = session.cancel.take() {
                token.cancel();
            }
            session.outbound = None;
            session.attempts = 0;
            session.last_error = None;
            self.inner.replay.clear();
            self.inner.apply(ConnectionState::Disconnected);
        }

        self.inner.deliver();
    }

    /// Serialize `request` as JSON and send it.
    ///
    /// Fails with [`WsError::NotConnected`] and writes nothing unless connected.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.send_text(json)
    }

    /// Send a raw text frame.
    pub fn send_text(&self, text: String) -> Result<()> {
        let session = self.inner.lock();
        self.inner.write(&session, text)
    }

    /// Send `request` now and again after every future reconnect, until
    /// [`Self::stop_replay`] is called with the same key.
    ///
    /// Nothing is remembered when the send itself fails.
    pub fn send_and_replay<K, R>(&self, key: K, request: &R) -> Result<()>
    where
        K: Into<String>,
        R: Serialize,
    {
        let json = serde_json::to_string(request)?;
        let session = self.inner.lock();
        self.inner.write(&session, json.clone())?;
        self.inner.replay.insert(key.into(), json);
        Ok(())
    }

    /// Forget the replay frame stored under `key`. Returns whether one was stored.
    pub fn stop_replay(&self, key: &str) -> bool {
        let _session = self.inner.lock();
        self.inner.replay.remove(key).is_some()
    }

    /// Number of frames replayed on the next open.
    #[must_use]
    pub fn replay_len(&self) -> usize {
        self.inner.replay.len()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive failed attempts since the last successful open or fresh `connect()`.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// The validated base endpoint, without scope or token.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Subscribe to connection state changes.
    ///
    /// A watch receiver only ever holds the latest state. Use
    /// [`Self::on_connection_state_change`] to observe every transition.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Register a handler for decoded messages matching `selector`.
    pub fn on<S, F>(&self, selector: S, handler: F) -> Unsubscribe
    where
        S: Into<Selector<M::Key>>,
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.inner.messages.on(selector, handler)
    }

    /// Register a handler for transitions into the states matching `selector`.
    pub fn on_state<S, F>(&self, selector: S, handler: F) -> Unsubscribe
    where
        S: Into<Selector<ConnectionState>>,
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.states.on(selector, handler)
    }

    /// Register a handler invoked once for every state transition, in transition order.
    ///
    /// Delivery is serialized. A transition applied while an earlier one is still being
    /// delivered is dispatched right after it by the caller already delivering.
    pub fn on_connection_state_change<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.states.on(Selector::Wildcard, handler)
    }

    /// Register a handler for inbound frames that failed to decode.
    pub fn on_decode_error<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&DecodeError) + Send + Sync + 'static,
    {
        self.inner.decode_errors.on(Selector::Wildcard, handler)
    }

    /// Remove every message, state and decode-error handler.
    pub fn clear_handlers(&self) {
        self.inner.messages.clear();
        self.inner.states.clear();
        self.inner.decode_errors.clear();
    }

    /// Total number of registered handlers across all kinds.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.messages.len() + self.inner.states.len() + self.inner.decode_errors.len()
    }
}

impl<M, P, T> Debug for ConnectionManager<M, P, T>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
    T: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.state())
            .field("replay", &self.inner.replay.len())
            .finish_non_exhaustive()
    }
}

impl<M, P, T> Inner<M, P, T>
where
    M: Routable + Debug + Send + Sync + 'static,
    P: MessageParser<M>,
    T: Transport,
{
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notifications(&self) -> MutexGuard<'_, Notifications> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `next` and queue it for listeners when the state actually changed.
    ///
    /// Must be called with the session lock held.
    fn apply(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            self.notifications().pending.push_back(next);
        }
    }

    /// Dispatch queued states in the order they were applied.
    ///
    /// Must be called without the session lock held, since listeners may call back in.
    fn deliver(&self) {
        {
            let mut notifications = self.notifications();
            if notifications.delivering {
                return;
            }
            notifications.delivering = true;
        }

        loop {
            let state = {
                let mut notifications = self.notifications();
                let Some(state) = notifications.pending.pop_front() else {
                    notifications.delivering = false;
                    return;
                };
                state
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(%state, endpoint = %self.endpoint, "Connection state changed");
            self.states.dispatch(&state);
        }
    }

    /// Apply `next` if `generation` is still current, then deliver it to listeners when the
    /// state actually changed. Returns `false` when the caller has been superseded.
    fn transition<F>(&self, generation: u64, next: ConnectionState, update: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        {
            let mut session = self.lock();
            if session.generation != generation {
                return false;
            }
            update(&mut session);
            self.apply(next);
        }

        self.deliver();
        true
    }

    fn write(&self, session: &Session, text: String) -> Result<()> {
        if !self.state_tx.borrow().is_connected() {
            return Err(WsError::NotConnected.into());
        }

        let outbound = session.outbound.as_ref().ok_or(WsError::NotConnected)?;
        outbound.send(text).map_err(|_e| WsError::NotConnected)?;
        Ok(())
    }

    /// Resolve the token and open the transport, bounded by the connect timeout.
    async fn open(&self) -> Result<(FrameSink, FrameStream)> {
        let attempt = async {
            let token = match &self.options.token {
                Some(source) => Some(source.resolve().await?),
                None => None,
            };
            let url = self.options.connection_url(&self.endpoint, token.as_ref())?;
            self.transport.open(&url).await
        };

        timeout(self.options.connect_timeout, attempt)
            .await
            .map_err(|_e| WsError::Timeout)?
    }

    /// Session loop: open, pump frames until the connection is lost, then consult the policy.
    async fn run(self: Arc<Self>, generation: u64, token: CancellationToken) {
        loop {
            let opened = tokio::select! {
                () = token.cancelled() => return,
                result = self.open() => result,
            };

            let error = match opened {
                Ok((sink, stream)) => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    let connected =
                        self.transition(generation, ConnectionState::Connected, |session| {
                            session.attempts = 0;
                            session.last_error = None;
                            for frame in &self.replay {
                                _ = outbound_tx.send(frame.value().clone());
                            }
                            session.outbound = Some(outbound_tx);
                        });
                    if !connected {
                        return;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::info!(endpoint = %self.endpoint, replayed = self.replay.len(), "Connected");

                    match self.pump(sink, stream, outbound_rx, &token).await {
                        Ok(()) => return,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let auth_failure = error
                .downcast_ref::<WsError>()
                .is_some_and(WsError::is_auth_failure);

            #[cfg(feature = "tracing")]
            tracing::warn!(endpoint = %self.endpoint, error = %error, "Connection attempt failed");

            let attempts = {
                let mut session = self.lock();
                if session.generation != generation {
                    return;
                }
                session.outbound = None;
                session.attempts = session.attempts.saturating_add(1);
                session.last_error = Some(Arc::new(error));
                session.attempts
            };

            let delay = if auth_failure && self.policy.config().stop_on_auth_failure {
                None
            } else {
                self.policy.next_delay(attempts)
            };

            let Some(delay) = delay else {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts, auth_failure, "Giving up on reconnecting");
                self.transition(generation, ConnectionState::Disconnected, |session| {
                    session.cancel = None;
                });
                return;
            };

            if !self.transition(generation, ConnectionState::Reconnecting, |_| {}) {
                return;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(attempts, ?delay, "Reconnecting after backoff");

            tokio::select! {
                () = token.cancelled() => return,
                () = sleep(delay) => {}
            }

            if !self.transition(generation, ConnectionState::Connecting, |_| {}) {
                return;
            }
        }
    }

    /// Move frames in both directions until cancelled (`Ok`) or the connection fails (`Err`).
    async fn pump(
        &self,
        mut sink: FrameSink,
        mut stream: FrameStream,
        mut outbound: mpsc::UnboundedReceiver<String>,
        token: &CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    _ = timeout(CLOSE_TIMEOUT, sink.close()).await;
                    return Ok(());
                }

                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_text(&text),
                    Some(Ok(Frame::Close(reason))) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(?reason, "Server closed the connection");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &reason;
                        return Err(WsError::ConnectionClosed.into());
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(WsError::ConnectionClosed.into()),
                },

                Some(text) = outbound.recv() => {
                    sink.send(text).await?;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match self.parser.parse(text) {
            Ok(message) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?message, "Parsed message");
                self.messages.dispatch(&message);
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Failed to decode frame");
                self.decode_errors.dispatch(&e);
            }
        }
    }
}
