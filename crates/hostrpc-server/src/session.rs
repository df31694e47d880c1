//! The serialized session task.
//!
//! Socket tasks, host change callbacks and replay timers never touch the
//! registry. They post a [`SessionEvent`] into one unbounded queue, and a
//! single [`SessionActor`] drains it, so node state, caches and subscriber
//! sets need no locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use hostrpc_registry::{ChangeSink, ClientId, PendingReplay, ValueChange};
use hostrpc_rpc::{Notification, RpcSession, encode, handle_message};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::metrics::EVENT_NOTIFICATIONS_TOTAL;
use crate::websocket::connection::ClientConnection;

/// Everything the session reacts to.
pub enum SessionEvent {
    /// A socket finished its upgrade.
    Open(Arc<ClientConnection>),
    /// A socket went away.
    Close(ClientId),
    /// A text frame.
    Text {
        /// Sender.
        client: ClientId,
        /// Frame payload.
        text: String,
    },
    /// A binary frame; handled as text when it is valid UTF-8.
    Binary {
        /// Sender.
        client: ClientId,
        /// Frame payload.
        data: Bytes,
    },
    /// A socket read failed.
    Error {
        /// Affected client.
        client: ClientId,
        /// Transport error text.
        message: String,
    },
    /// The host pushed a new value.
    ValueChanged(ValueChange),
    /// A first-subscriber replay came due.
    Replay(PendingReplay),
    /// Stop the session.
    Stop,
}

/// Receiving end of the session queue.
pub type SessionInbox = mpsc::UnboundedReceiver<SessionEvent>;

/// Cloneable sending end of the session queue.
#[derive(Clone)]
pub struct SessionQueue {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionQueue {
    /// Create the queue.
    pub fn channel() -> (Self, SessionInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post an event. `false` once the session has stopped.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// A registry change sink that posts [`SessionEvent::ValueChanged`].
    pub fn change_sink(&self) -> ChangeSink {
        let tx = self.tx.clone();
        Arc::new(move |change| {
            let _ = tx.send(SessionEvent::ValueChanged(change));
        })
    }
}

/// Counters published by the session for `/health`.
#[derive(Debug, Default)]
pub struct SessionStats {
    connections: AtomicUsize,
    methods: AtomicUsize,
    events: AtomicUsize,
}

impl SessionStats {
    /// Open connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Dispatchable methods.
    pub fn methods(&self) -> usize {
        self.methods.load(Ordering::Relaxed)
    }

    /// Event nodes.
    pub fn events(&self) -> usize {
        self.events.load(Ordering::Relaxed)
    }

    /// Record the namespace size.
    pub fn set_namespace(&self, methods: usize, events: usize) {
        self.methods.store(methods, Ordering::Relaxed);
        self.events.store(events, Ordering::Relaxed);
    }

    fn set_connections(&self, connections: usize) {
        self.connections.store(connections, Ordering::Relaxed);
    }
}

/// Owner of the RPC session and the connected clients.
pub struct SessionActor {
    session: RpcSession,
    clients: HashMap<ClientId, Arc<ClientConnection>>,
    queue: SessionQueue,
    inbox: SessionInbox,
    replay_delay: Duration,
    stats: Arc<SessionStats>,
}

impl SessionActor {
    /// Create the actor; it starts working in [`run`](Self::run).
    pub fn new(
        session: RpcSession,
        queue: SessionQueue,
        inbox: SessionInbox,
        replay_delay: Duration,
        stats: Arc<SessionStats>,
    ) -> Self {
        stats.set_namespace(
            session.builtins().len() + session.registry().method_count(),
            session.registry().event_count(),
        );
        Self {
            session,
            clients: HashMap::new(),
            queue,
            inbox,
            replay_delay,
            stats,
        }
    }

    /// Drain the queue until [`SessionEvent::Stop`], cancellation or every
    /// sender is gone, then release all subscriptions.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            methods = self.stats.methods(),
            events = self.stats.events(),
            "session started"
        );
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = self.inbox.recv() => event,
            };
            match event {
                None | Some(SessionEvent::Stop) => break,
                Some(event) => self.handle(event),
            }
        }
        self.teardown();
    }

    /// Process one event.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Open(connection) => {
                debug!(client_id = %connection.id, remote = %connection.remote, "session: client opened");
                let _ = self.clients.insert(connection.id.clone(), connection);
                self.stats.set_connections(self.clients.len());
            }
            SessionEvent::Close(client) => {
                debug!(client_id = %client, "session: client closed");
                let _ = self.clients.remove(&client);
                self.session.disconnect(&client);
                self.stats.set_connections(self.clients.len());
            }
            SessionEvent::Text { client, text } => self.dispatch(&client, &text),
            SessionEvent::Binary { client, data } => match std::str::from_utf8(&data) {
                Ok(text) => self.dispatch(&client, text),
                Err(_) => debug!(client_id = %client, len = data.len(), "ignoring non-UTF-8 binary frame"),
            },
            SessionEvent::Error { client, message } => {
                warn!(client_id = %client, error = %message, "transport error");
            }
            SessionEvent::ValueChanged(change) => self.fan_out(change),
            SessionEvent::Replay(pending) => self.replay(&pending),
            SessionEvent::Stop => {}
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn dispatch(&mut self, client: &ClientId, text: &str) {
        trace!(client_id = %client, len = text.len(), "session: message");
        let outcome = handle_message(text, &mut self.session, client);

        if let Some(connection) = self.clients.get(client) {
            if let Some(reply) = outcome.reply {
                let _ = connection.send(Arc::new(reply));
            }
            for notification in outcome.notifications {
                let _ = connection.send(Arc::new(notification));
            }
        }

        for notification in &outcome.broadcasts {
            let message = Arc::new(encode(notification));
            for connection in self.clients.values() {
                let _ = connection.send(message.clone());
            }
        }

        for pending in outcome.replays {
            self.schedule_replay(pending);
        }
    }

    fn schedule_replay(&self, pending: PendingReplay) {
        let queue = self.queue.clone();
        let delay = self.replay_delay;
        drop(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = queue.send(SessionEvent::Replay(pending));
        }));
    }

    fn replay(&self, pending: &PendingReplay) {
        let Some(connection) = self.clients.get(&pending.client) else {
            return;
        };
        if let Some(payload) = self.session.registry().replay(pending) {
            trace!(client_id = %pending.client, event = payload.event, "replaying current value");
            let _ = connection.send(Arc::new(encode(&Notification::from(payload))));
        }
    }

    fn fan_out(&mut self, change: ValueChange) {
        let Some((payload, subscribers)) = self.session.registry_mut().on_value_changed(change)
        else {
            return;
        };
        counter!(EVENT_NOTIFICATIONS_TOTAL, "event" => payload.event.clone()).increment(1);
        let message = Arc::new(encode(&Notification::from(payload)));
        for client in &subscribers {
            if let Some(connection) = self.clients.get(client) {
                let _ = connection.send(message.clone());
            }
        }
    }

    fn teardown(&mut self) {
        self.session.registry_mut().clear();
        self.clients.clear();
        self.stats.set_connections(0);
        info!("session stopped");
    }
}
