//! The real-time connection manager.
//!
//! One [`ConnectionManager`] owns the hub connection for the signed-in user:
//! it tracks [`ConnectionState`] from the transport's lifecycle events, fans
//! pushed hub events out to listeners and parks outgoing messages in an
//! [`OutboundQueue`] while offline. The queue is flushed when the initial
//! connect succeeds and after every automatic reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hubchat_shared::constants::{METHOD_GET_CONVERSATION, METHOD_SEND_MESSAGE};
use hubchat_shared::{ConnectionState, Message, PendingMessage, ServerEvent, User, UserId};

use crate::error::HubError;
use crate::events::{
    Listeners, Subscription, EVENT_CONNECTION_STATE_CHANGED, EVENT_CONVERSATION_HISTORY,
    EVENT_MESSAGE_RECEIVED, EVENT_MESSAGE_SENT, EVENT_USER_REGISTERED,
};
use crate::hub::queue::OutboundQueue;
use crate::hub::transport::{HubTransport, TransportEvent, TransportFactory};
use crate::lock;

/// The live transport plus the task draining its events.
struct Link {
    generation: u64,
    transport: Arc<dyn HubTransport>,
    pump: JoinHandle<()>,
}

struct Inner {
    factory: Arc<dyn TransportFactory>,
    link: Mutex<Option<Link>>,
    state: Mutex<ConnectionState>,
    generation: AtomicU64,
    queue: OutboundQueue,
    flushing: AtomicBool,
    flush_requested: AtomicBool,

    message_received: Listeners<Message>,
    message_sent: Listeners<Message>,
    conversation_history: Listeners<Vec<Message>>,
    state_changed: Listeners<ConnectionState>,
    user_registered: Listeners<User>,
}

/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                link: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
                queue: OutboundQueue::new(),
                flushing: AtomicBool::new(false),
                flush_requested: AtomicBool::new(false),
                message_received: Listeners::new(EVENT_MESSAGE_RECEIVED),
                message_sent: Listeners::new(EVENT_MESSAGE_SENT),
                conversation_history: Listeners::new(EVENT_CONVERSATION_HISTORY),
                state_changed: Listeners::new(EVENT_CONNECTION_STATE_CHANGED),
                user_registered: Listeners::new(EVENT_USER_REGISTERED),
            }),
        }
    }

    /// Replace any existing connection with a new one authenticated by
    /// `credential`.
    ///
    /// Event handling is in place before the transport starts, so nothing the
    /// server pushes right after the handshake is lost. A failed handshake
    /// leaves the state at [`ConnectionState::Error`] and is returned.
    pub async fn connect(&self, credential: &str) -> Result<(), HubError> {
        self.disconnect().await;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let transport = match self.inner.factory.create(credential, events_tx) {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "Failed to create hub transport");
                self.inner.set_state(ConnectionState::Error);
                return Err(e);
            }
        };

        let pump = tokio::spawn(pump(Arc::downgrade(&self.inner), generation, events_rx));
        *lock(&self.inner.link) = Some(Link {
            generation,
            transport: transport.clone(),
            pump,
        });
        self.inner.set_state(ConnectionState::Connecting);

        match transport.start().await {
            Ok(()) => {
                if !self.inner.is_current(generation) {
                    debug!(generation, "Connection replaced while starting");
                    return Ok(());
                }
                self.inner.set_state(ConnectionState::Connected);
                info!(generation, "Hub connected");
                self.flush_queue().await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Hub connection failed");
                if let Some(link) = self.inner.take_link(generation) {
                    link.pump.abort();
                    self.inner.set_state(ConnectionState::Error);
                }
                transport.stop().await;
                Err(e)
            }
        }
    }

    /// Close the connection. Calling it with no connection does nothing.
    pub async fn disconnect(&self) {
        let link = lock(&self.inner.link).take();
        let Some(link) = link else {
            return;
        };

        link.transport.stop().await;
        link.pump.abort();
        self.inner.set_state(ConnectionState::Disconnected);
        info!(generation = link.generation, "Hub disconnected");
    }

    /// Send a chat message, or queue it until the next successful connect.
    /// A failed send is queued again; nothing is reported to the caller.
    pub async fn send_message(&self, receiver_id: UserId, content: &str) {
        let pending = PendingMessage {
            receiver_id,
            content: content.to_string(),
        };

        let Some(transport) = self.inner.live_transport() else {
            let depth = self.inner.queue.push(pending);
            info!(receiver = %receiver_id, queued = depth, "Offline; message queued");
            return;
        };

        let arguments = vec![Value::from(receiver_id.0), Value::from(content)];
        match transport.invoke(METHOD_SEND_MESSAGE, arguments).await {
            Ok(_) => debug!(receiver = %receiver_id, "Message sent"),
            Err(e) => {
                let depth = self.inner.queue.push(pending);
                warn!(receiver = %receiver_id, error = %e, queued = depth, "Send failed; message re-queued");
            }
        }
    }

    /// Ask the hub for the history with `other_user_id`. The answer arrives
    /// through [`on_conversation_history`](Self::on_conversation_history).
    /// Offline requests are dropped.
    pub async fn get_conversation(&self, other_user_id: UserId) {
        let Some(transport) = self.inner.live_transport() else {
            warn!(user = %other_user_id, "Offline; conversation request dropped");
            return;
        };

        let arguments = vec![Value::from(other_user_id.0)];
        if let Err(e) = transport.invoke(METHOD_GET_CONVERSATION, arguments).await {
            warn!(user = %other_user_id, error = %e, "Conversation request failed");
        }
    }

    /// Resend everything queued, in order. Only one flush runs at a time; a
    /// call made while one runs makes the running flush go round again
    /// once its current batch is done.
    pub async fn flush_queue(&self) {
        self.inner.flush_requested.store(true, Ordering::SeqCst);
        loop {
            if self.inner.flushing.swap(true, Ordering::SeqCst) {
                debug!("Flush already in progress; another round requested");
                return;
            }
            self.drain_requests().await;

            // A request that landed between the last check and the release.
            if !self.inner.flush_requested.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn drain_requests(&self) {
        let _guard = FlushGuard(&self.inner.flushing);

        while self.inner.flush_requested.swap(false, Ordering::SeqCst) {
            if self.inner.live_transport().is_none() {
                debug!("Offline; flush deferred to the next connect");
                return;
            }

            let pending = self.inner.queue.drain();
            if pending.is_empty() {
                continue;
            }

            info!(count = pending.len(), "Flushing queued messages");
            for message in pending {
                self.send_message(message.receiver_id, &message.content).await;
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub fn queued_messages(&self) -> Vec<PendingMessage> {
        self.inner.queue.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn on_message_received<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.message_received.subscribe(listener)
    }

    /// Confirmation of a message this client sent, as stored by the server.
    pub fn on_message_sent<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.message_sent.subscribe(listener)
    }

    pub fn on_conversation_history<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        self.inner
            .conversation_history
            .subscribe(move |messages: &Vec<Message>| listener(messages))
    }

    pub fn on_connection_state_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.state_changed.subscribe(listener)
    }

    pub fn on_user_registered<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&User) + Send + Sync + 'static,
    {
        self.inner.user_registered.subscribe(listener)
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *lock(&self.state), next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
            self.state_changed.emit(&next);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&*lock(&self.link), Some(link) if link.generation == generation)
    }

    fn take_link(&self, generation: u64) -> Option<Link> {
        let mut link = lock(&self.link);
        match &*link {
            Some(current) if current.generation == generation => link.take(),
            _ => None,
        }
    }

    /// The transport, if and only if the state says we are connected.
    fn live_transport(&self) -> Option<Arc<dyn HubTransport>> {
        if !lock(&self.state).is_connected() {
            return None;
        }
        lock(&self.link).as_ref().map(|link| link.transport.clone())
    }

    fn handle(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Invocation { target, arguments } => self.dispatch(&target, arguments),
            TransportEvent::Reconnecting { error } => {
                warn!(error = ?error, "Hub connection lost; reconnecting");
                self.set_state(ConnectionState::Reconnecting);
            }
            TransportEvent::Reconnected => {
                info!("Hub reconnected");
                self.set_state(ConnectionState::Connected);
                let manager = ConnectionManager {
                    inner: self.clone(),
                };
                tokio::spawn(async move { manager.flush_queue().await });
            }
            TransportEvent::Closed { error } => {
                let next = match &error {
                    Some(reason) => {
                        error!(reason = %reason, "Hub connection closed");
                        ConnectionState::Error
                    }
                    None => {
                        info!("Hub connection closed");
                        ConnectionState::Disconnected
                    }
                };
                // Dropping the handle detaches the pump; it ends with the channel.
                let _ = self.take_link(generation);
                self.set_state(next);
            }
        }
    }

    fn dispatch(&self, target: &str, arguments: Vec<Value>) {
        let event = match ServerEvent::from_invocation(target, arguments) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(method = target, "Ignoring unhandled hub method");
                return;
            }
            Err(e) => {
                warn!(method = target, error = %e, "Malformed hub event");
                return;
            }
        };

        match event {
            ServerEvent::ReceiveMessage(message) => {
                debug!(id = message.id, from = %message.sender_id, "Message received");
                self.message_received.emit(&message);
            }
            ServerEvent::MessageSent(message) => {
                debug!(id = message.id, to = %message.receiver_id, "Message confirmed");
                self.message_sent.emit(&message);
            }
            ServerEvent::ConversationHistory(messages) => {
                debug!(count = messages.len(), "Conversation history received");
                self.conversation_history.emit(&messages);
            }
            ServerEvent::UserRegistered(user) => {
                debug!(user = %user.id, username = %user.username, "User registered");
                self.user_registered.emit(&user);
            }
            ServerEvent::Error(detail) => warn!(detail = %detail, "Hub reported an error"),
        }
    }
}

async fn pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_current(generation) {
            debug!(generation, "Ignoring event from a replaced connection");
            continue;
        }
        inner.handle(generation, event);
    }
}
