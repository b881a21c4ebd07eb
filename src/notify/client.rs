use tokio::sync::watch;

use super::codec::{NotificationCodec, encode};
use super::types::request::SubscriptionRequest;
use super::types::response::{Message, MessageType, Meta};
use crate::Result;
use crate::types::{Utc, Uuid};
use crate::ws::{
    ConnectionManager, ConnectionOptions, ConnectionState, DecodeError, Selector, Transport,
    Unsubscribe, WebSocketTransport,
};

/// Notification channel client.
///
/// Wraps a [`ConnectionManager`] speaking the notification protocol. Job and repository
/// subscriptions are remembered and sent again after every reconnect until explicitly
/// unsubscribed or until [`Client::disconnect`] is called.
///
/// # Example
///
/// ```rust, no_run
/// use notify_client_sdk::auth::TokenSource;
/// use notify_client_sdk::notify::{Client, Message, MessageType};
/// use notify_client_sdk::ws::ConnectionOptions;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let options = ConnectionOptions::builder()
///         .endpoint("wss://notify.example.com/ws")
///         .token(TokenSource::fixed("secret"))
///         .build();
///     let client = Client::new(options)?;
///
///     let _progress = client.on(MessageType::JobProgress, |message: &Message| {
///         println!("{message:?}");
///     });
///
///     client.connect().await?;
///     client.subscribe_to_job("job-1")?;
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client<T: Transport = WebSocketTransport> {
    connection: ConnectionManager<Message, NotificationCodec, T>,
}

impl Client {
    /// Create a client over WebSocket. Nothing is opened until [`Client::connect`].
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        Self::with_transport(options, WebSocketTransport)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(options: ConnectionOptions, transport: T) -> Result<Self> {
        let connection = ConnectionManager::with_transport(options, NotificationCodec, transport)?;
        Ok(Self { connection })
    }

    /// The underlying connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager<Message, NotificationCodec, T> {
        &self.connection
    }

    /// See [`ConnectionManager::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    /// Close the connection, stop reconnecting and forget every remembered subscription.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Send a message. Fails with `NotConnected` and writes nothing unless connected.
    pub fn send(&self, message: &Message) -> Result<()> {
        self.connection.send_text(encode(message)?)
    }

    /// Send a liveness probe carrying a fresh correlation id, which is returned.
    pub fn ping(&self) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let meta = Meta::builder()
            .id(id.to_string())
            .timestamp(Utc::now())
            .build();

        self.send(&Message::Ping(meta))?;
        Ok(id)
    }

    /// Start receiving progress for `job_id`, now and after every reconnect.
    pub fn subscribe_to_job(&self, job_id: &str) -> Result<()> {
        self.subscribe(&SubscriptionRequest::subscribe_job(job_id))
    }

    pub fn unsubscribe_from_job(&self, job_id: &str) -> Result<()> {
        self.unsubscribe(&SubscriptionRequest::unsubscribe_job(job_id))
    }

    /// Start receiving status and sync events for `repo_id`, now and after every reconnect.
    pub fn subscribe_to_repo(&self, repo_id: &str) -> Result<()> {
        self.subscribe(&SubscriptionRequest::subscribe_repo(repo_id))
    }

    pub fn unsubscribe_from_repo(&self, repo_id: &str) -> Result<()> {
        self.unsubscribe(&SubscriptionRequest::unsubscribe_repo(repo_id))
    }

    fn subscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        self.connection.send_and_replay(request.intent_key(), request)
    }

    /// The intent is forgotten even when the unsubscribe frame cannot be sent.
    fn unsubscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        self.connection.stop_replay(&request.intent_key());
        self.connection.send(request)
    }

    /// Register a handler for messages of one type, or for every message with
    /// [`Selector::Wildcard`]. Type handlers run before wildcard handlers.
    pub fn on<S, F>(&self, selector: S, handler: F) -> Unsubscribe
    where
        S: Into<Selector<MessageType>>,
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.connection.on(selector, handler)
    }

    pub fn on_connection_state_change<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.connection.on_connection_state_change(handler)
    }

    pub fn on_decode_error<F>(&self, handler: F) -> Unsubscribe
    where
        F: Fn(&DecodeError) + Send + Sync + 'static,
    {
        self.connection.on_decode_error(handler)
    }

    /// Remove every message, state and decode-error handler.
    pub fn clear_handlers(&self) {
        self.connection.clear_handlers();
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_receiver()
    }

    /// Number of job and repository subscriptions replayed on reconnect.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.connection.replay_len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::StreamExt as _;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::ws::testing::{Script, ScriptedTransport, ServerEnd};
    use crate::ws::{ReconnectConfig, WsError};

    fn client(
        script: Vec<Script>,
    ) -> (Client<ScriptedTransport>, mpsc::UnboundedReceiver<ServerEnd>) {
        let options = ConnectionOptions::builder()
            .endpoint("ws://notify.test/ws")
            .reconnect(
                ReconnectConfig::builder()
                    .max_attempts(3)
                    .initial_backoff(Duration::from_millis(50))
                    .build(),
            )
            .build();
        let (transport, servers) = ScriptedTransport::new(script);
        (Client::with_transport(options, transport).unwrap(), servers)
    }

    async fn next_json(server: &mut ServerEnd) -> Value {
        serde_json::from_str(&server.outbound.next().await.unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn job_progress_reaches_type_and_wildcard_handlers_once() {
        let (client, mut servers) = client(vec![Script::Accept]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, mut done) = mpsc::unbounded_channel();

        let typed = Arc::clone(&seen);
        let _typed = client.on(MessageType::JobProgress, move |message: &Message| {
            let Message::JobProgress(job) = message else {
                return;
            };
            typed.lock().unwrap().push(("typed", job.progress));
        });
        let wild = Arc::clone(&seen);
        let _wild = client.on(Selector::Wildcard, move |message: &Message| {
            if let Message::JobProgress(job) = message {
                wild.lock().unwrap().push(("wildcard", job.progress));
            }
            _ = done_tx.send(());
        });
        let other = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&other);
        let _other = client.on(MessageType::RepoStatus, move |_: &Message| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await.unwrap();
        let server = servers.recv().await.unwrap();
        server.push_text(
            r#"{"type":"job_progress","job_id":"j1","status":"processing","progress":42}"#,
        );
        done.recv().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("typed", 42.0), ("wildcard", 42.0)]
        );
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn subscriptions_are_sent_and_tracked() {
        let (client, mut servers) = client(vec![Script::Accept]);

        client.connect().await.unwrap();
        let mut server = servers.recv().await.unwrap();

        client.subscribe_to_job("j1").unwrap();
        client.subscribe_to_repo("r1").unwrap();
        client.subscribe_to_job("j1").unwrap();
        assert_eq!(client.subscription_count(), 2);

        client.unsubscribe_from_job("j1").unwrap();
        assert_eq!(client.subscription_count(), 1);

        let frames = [
            next_json(&mut server).await,
            next_json(&mut server).await,
            next_json(&mut server).await,
            next_json(&mut server).await,
        ];
        assert_eq!(
            frames,
            [
                json!({ "type": "subscribe_job", "job_id": "j1" }),
                json!({ "type": "subscribe_repo", "repo_id": "r1" }),
                json!({ "type": "subscribe_job", "job_id": "j1" }),
                json!({ "type": "unsubscribe_job", "job_id": "j1" }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subscriptions_are_replayed_after_reconnect() {
        let (client, mut servers) = client(vec![Script::Accept, Script::Accept]);

        client.connect().await.unwrap();
        let mut first = servers.recv().await.unwrap();
        client.subscribe_to_repo("r1").unwrap();
        next_json(&mut first).await;
        drop(first);

        let mut second = servers.recv().await.unwrap();
        assert_eq!(
            next_json(&mut second).await,
            json!({ "type": "subscribe_repo", "repo_id": "r1" })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn writes_fail_while_disconnected() {
        let (client, _servers) = client(vec![]);

        let err = client.subscribe_to_job("j1").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WsError>(),
            Some(WsError::NotConnected)
        ));
        client.ping().unwrap_err();
        client.send(&Message::Pong(Meta::default())).unwrap_err();
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_carries_fresh_correlation_id() {
        let (client, mut servers) = client(vec![Script::Accept]);

        client.connect().await.unwrap();
        let mut server = servers.recv().await.unwrap();

        let first = client.ping().unwrap();
        let second = client.ping().unwrap();
        assert_ne!(first, second);

        let frame = next_json(&mut server).await;
        assert_eq!(frame["type"], "ping");
        assert_eq!(frame["id"], first.to_string());
        assert!(frame["timestamp"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frames_reach_decode_listeners() {
        let (client, mut servers) = client(vec![Script::Accept]);
        let (errors_tx, mut errors) = mpsc::unbounded_channel();
        let _decode = client.on_decode_error(move |error: &DecodeError| {
            _ = errors_tx.send(error.clone());
        });
        let dispatched = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dispatched);
        let _wild = client.on(Selector::Wildcard, move |_: &Message| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await.unwrap();
        let server = servers.recv().await.unwrap();
        server.push_text(r#"{"type":"bogus"}"#);

        let error = errors.recv().await.unwrap();
        assert_eq!(error.raw, r#"{"type":"bogus"}"#);
        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_forgets_subscriptions() {
        let (client, mut servers) = client(vec![Script::Accept]);
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let _states = client.on_connection_state_change(move |state| {
            sink.lock().unwrap().push(state.to_string());
        });

        client.connect().await.unwrap();
        let _server = servers.recv().await.unwrap();
        client.subscribe_to_job("j1").unwrap();

        client.disconnect();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.subscription_count(), 0);
        assert_eq!(
            *states.lock().unwrap(),
            vec!["connecting", "connected", "disconnected"]
        );
    }
}
