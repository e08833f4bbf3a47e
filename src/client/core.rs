use super::{ChatClientBuilder, ChatClientOptions, ClientState, ConnectionState};
use crate::infrastructure::{CredentialProvider, Delivery, OutboxEntry};
use crate::messaging::{ChatEvent, Frame, ReadReceipt};
use crate::subscription::{Handler, Subscription, TopicKey};
use crate::types::Result;
use crate::types::constants::destinations;
use crate::websocket::Connector;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Notify, oneshot, watch};
use url::Url;

static GLOBAL: OnceLock<ChatClient> = OnceLock::new();

/// The shared realtime chat connection.
///
/// One `ChatClient` multiplexes every room and user-event subscription of
/// the application over a single STOMP session. It reconnects on its own
/// with exponential backoff, re-establishes subscriptions after every
/// reconnect, queues publishes made while offline and drops duplicate
/// room deliveries. None of the realtime calls return errors: failures are
/// logged and recovered, and [`is_connected`](Self::is_connected) is the
/// only signal consumers need for connectivity UI.
///
/// Clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use storefront_chat_rs::{ChatClient, ChatClientOptions, ChatEvent};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ChatClient::new(ChatClientOptions::from_env())?;
///
/// let room = client.subscribe_room_messages(42, |event: &ChatEvent| {
///     println!("{:?}: {:?}", event.event_type, event.content);
/// });
///
/// client.connect().await;
/// client.send_message(42, ChatEvent::text("hello"));
///
/// room.unsubscribe();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) endpoint: Arc<Url>,
    pub(crate) host: Arc<str>,
    pub(crate) options: Arc<ChatClientOptions>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) connector: Arc<dyn Connector>,

    // Consolidated mutable state
    pub(crate) state: Arc<Mutex<ClientState>>,

    // Cuts a backoff sleep short
    pub(crate) wake: Arc<Notify>,
}

impl ChatClient {
    /// Creates a client with anonymous credentials and the WebSocket transport.
    ///
    /// Nothing connects until [`connect`](Self::connect) or
    /// [`resume`](Self::resume) is called.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`](crate::ChatError::Config) or
    /// [`ChatError::UrlParse`](crate::ChatError::UrlParse) when the options
    /// do not validate.
    pub fn new(options: ChatClientOptions) -> Result<Self> {
        ChatClientBuilder::new(options).map(|builder| builder.build())
    }

    /// Starts a builder, for plugging in credentials or a custom transport.
    ///
    /// ```no_run
    /// use storefront_chat_rs::{ChatClient, ChatClientOptions, TokenStore};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let tokens = TokenStore::new(Some("access-token".to_string()));
    /// let client = ChatClient::builder(ChatClientOptions::default())?
    ///     .credentials(tokens.clone())
    ///     .build();
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(options: ChatClientOptions) -> Result<ChatClientBuilder> {
        ChatClientBuilder::new(options)
    }

    /// Makes `client` the process-wide instance. The first install wins;
    /// later calls return the already installed client.
    pub fn install_global(client: ChatClient) -> &'static ChatClient {
        GLOBAL.get_or_init(|| client)
    }

    pub fn global() -> Option<&'static ChatClient> {
        GLOBAL.get()
    }

    /// Waits until the client is connected, starting the connection if needed.
    ///
    /// Idempotent: while a connection attempt is in flight, concurrent callers
    /// wait for that same attempt; when already connected this returns
    /// immediately. Failed attempts are retried with backoff until one
    /// succeeds, so the future only completes once connected (or when the
    /// client is shut down). Dropping the future stops waiting but does not
    /// cancel the connection.
    pub async fn connect(&self) {
        self.connect_with(|| {}).await
    }

    /// [`connect`](Self::connect), then runs `on_ready` once connected
    pub async fn connect_with<F>(&self, on_ready: F)
    where
        F: FnOnce(),
    {
        let waiter = {
            let mut state = self.state.lock();
            if state.shut_down {
                tracing::warn!("connect() called after shutdown, ignoring");
                return;
            }
            match state.status {
                ConnectionState::Connected => None,
                ConnectionState::Connecting | ConnectionState::Disconnected => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(tx);
                    if state.status == ConnectionState::Disconnected {
                        self.begin_connect(&mut state);
                    }
                    Some(rx)
                }
            }
        };

        if let Some(rx) = waiter
            && rx.await.is_err()
        {
            tracing::debug!("Client shut down before the connection was ready");
            return;
        }
        on_ready();
    }

    /// Environment re-activation signal (e.g. the app returned to the
    /// foreground). Reconnects immediately when disconnected, skipping any
    /// pending backoff delay.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.shut_down || state.status != ConnectionState::Disconnected {
            return;
        }
        tracing::info!("Resuming chat connection");
        self.begin_connect(&mut state);
    }

    /// Intentionally does nothing.
    ///
    /// The connection is shared by unrelated consumers (a room list and an
    /// open room, say); one of them going away must not cut off the others.
    /// Release individual interests with [`Subscription::unsubscribe`] and
    /// use [`shutdown`](Self::shutdown) at process exit.
    pub fn disconnect(&self) {
        tracing::debug!("disconnect() ignored: the chat connection is shared");
    }

    /// Tears the connection down for good: sends DISCONNECT, stops the
    /// reconnect loop and releases pending `connect` callers. Meant for
    /// application exit; the client cannot be reconnected afterwards.
    pub async fn shutdown(&self) {
        let supervisor = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            if state.is_connected()
                && let Err(e) = state.connection.send_frame(&Frame::disconnect())
            {
                tracing::debug!("DISCONNECT not sent: {}", e);
            }
            state.connection.detach();
            state.task_manager.abort_all();
            state.registry.detach_all();
            state.waiters.clear();
            state.set_status(ConnectionState::Disconnected);
            state.supervisor.take()
        };

        if let Some(handle) = supervisor {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("Chat client shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().status
    }

    /// Observes connection state changes (for "reconnecting..." banners)
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.lock().watch_status()
    }

    /// Topics that currently have at least one handler
    pub fn active_topics(&self) -> Vec<TopicKey> {
        self.state.lock().registry.topics().copied().collect()
    }

    /// Publishes waiting for the next connection
    pub fn pending_publishes(&self) -> usize {
        self.state.lock().outbox.len()
    }

    /// Delivers every message (and read receipt) posted in `room_id` to
    /// `handler`. Room deliveries are deduplicated.
    ///
    /// Room id 0 is invalid: nothing is registered and the returned
    /// handle is inert.
    pub fn subscribe_room_messages<F>(&self, room_id: u64, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        if room_id == 0 {
            tracing::warn!("Ignoring room subscription for invalid room id 0");
            return Subscription::inert();
        }
        self.subscribe_topic(TopicKey::Room(room_id), Arc::new(handler))
    }

    /// Delivers room lifecycle events for `user_id`.
    ///
    /// Only one user is observed at a time: subscribing for a different
    /// user drops the previous user's topic together with all of its
    /// handlers.
    pub fn subscribe_user_room_events<F>(&self, user_id: u64, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        if user_id == 0 {
            tracing::warn!("Ignoring room-event subscription for invalid user id 0");
            return Subscription::inert();
        }
        self.subscribe_topic(TopicKey::UserEvents(user_id), Arc::new(handler))
    }

    /// Publishes a chat message to `room_id`, queueing it while offline.
    ///
    /// Delivery is at-least-once; give the event a `clientMsgId` (the
    /// [`ChatEvent::text`] and [`ChatEvent::image`] constructors do) so
    /// the server can recognize retries.
    pub fn send_message(&self, room_id: u64, message: ChatEvent) {
        if room_id == 0 {
            tracing::warn!("Ignoring send to invalid room id 0");
            return;
        }
        match serde_json::to_string(&message) {
            Ok(payload) => {
                self.publish(format!("{}/{}", destinations::SEND, room_id), payload)
            }
            Err(e) => tracing::error!("Failed to serialize message for room {}: {}", room_id, e),
        }
    }

    /// Publishes a read receipt up to `last_read_message_id`
    pub fn send_read(&self, room_id: u64, last_read_message_id: u64) {
        if room_id == 0 {
            tracing::warn!("Ignoring read receipt for invalid room id 0");
            return;
        }
        let receipt = ReadReceipt {
            last_read_message_id,
        };
        match serde_json::to_string(&receipt) {
            Ok(payload) => {
                self.publish(format!("{}/{}", destinations::READ, room_id), payload)
            }
            Err(e) => tracing::error!("Failed to serialize read receipt: {}", e),
        }
    }

    fn subscribe_topic(&self, key: TopicKey, handler: Handler) -> Subscription {
        let handler_id = {
            let mut state = self.state.lock();
            let connected = state.is_connected();
            let (handler_id, frames) = state.registry.add(key, handler, connected);
            for frame in &frames {
                if let Err(e) = state.connection.send_frame(frame) {
                    tracing::warn!("{} for {} not sent: {}", frame.command, key, e);
                }
            }
            handler_id
        };
        tracing::info!("Subscribed to {}", key);

        let state = Arc::downgrade(&self.state);
        Subscription::new(key, move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.lock();
            let frames = state.registry.remove(key, handler_id);
            for frame in &frames {
                if let Err(e) = state.connection.send_frame(frame) {
                    tracing::debug!("{} for {} not sent: {}", frame.command, key, e);
                }
            }
            tracing::debug!("Unsubscribed handler {} from {}", handler_id, key);
        })
    }

    fn publish(&self, destination: String, payload: String) {
        // fetched per publish so a rotated token applies without reconnecting
        let token = self.credentials.access_token();
        let mut entry = OutboxEntry::new(destination, payload);
        entry.headers = Frame::json_headers();

        let mut state = self.state.lock();
        let connected = state.is_connected();
        let ClientState {
            outbox, connection, ..
        } = &mut *state;
        let destination = entry.destination.clone();
        match outbox.enqueue_or_send(entry, connected, |e| connection.publish(e, token.as_deref())) {
            Delivery::Sent => tracing::debug!("Published to {}", destination),
            Delivery::Queued => tracing::debug!(
                "Publish to {} queued ({} pending)",
                destination,
                outbox.len()
            ),
        }
    }
}
