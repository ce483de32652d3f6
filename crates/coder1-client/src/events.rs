//! Client events and the hub that fans them out.
//!
//! Two delivery paths exist side by side: synchronous listeners registered
//! with [`EventHub::on`] run on the connection task in registration order,
//! and [`EventHub::subscribe`] hands out a broadcast receiver for async
//! consumers. Slow broadcast receivers lag instead of blocking the task.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use coder1_core::{ClientId, SessionId, StreamId};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Default broadcast capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Something observable that happened on the client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// The socket opened.
    Connected {
        /// Socket URL.
        url: String,
    },
    /// The server assigned this client an id.
    Identified {
        /// Server-assigned id.
        client_id: ClientId,
    },
    /// The socket closed, explicitly or not.
    Disconnected {
        /// Close reason.
        reason: String,
    },
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured ceiling.
        max_attempts: u32,
    },
    /// A transport-level error.
    Error {
        /// Error text.
        message: String,
    },
    /// Any parsed inbound frame, untouched.
    Message {
        /// The raw frame.
        frame: Value,
    },
    /// The server began generating a stream.
    StreamStart {
        /// Stream id.
        stream_id: StreamId,
    },
    /// A stream chunk arrived.
    StreamChunk {
        /// Stream id.
        stream_id: StreamId,
        /// Chunk text.
        chunk: String,
        /// Server-accumulated text after this chunk.
        accumulated: String,
    },
    /// A stream finished.
    StreamComplete {
        /// Stream id.
        stream_id: StreamId,
        /// Final content.
        content: String,
        /// Duration in milliseconds, when known.
        duration_ms: Option<u64>,
    },
    /// A stream failed.
    StreamError {
        /// Stream id.
        stream_id: StreamId,
        /// Error text.
        error: String,
    },
    /// A stream was stopped.
    StreamStopped {
        /// Stream id.
        stream_id: StreamId,
    },
    /// Session status update.
    Status {
        /// Session id.
        session_id: SessionId,
        /// Status payload.
        data: Value,
    },
    /// Session output.
    Output {
        /// Session id.
        session_id: SessionId,
        /// Output payload.
        output: Value,
    },
    /// Heartbeat reply.
    Pong,
}

/// Discriminant of [`ClientEvent`], used to filter listeners.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Identified,
    Disconnected,
    Reconnecting,
    Error,
    Message,
    StreamStart,
    StreamChunk,
    StreamComplete,
    StreamError,
    StreamStopped,
    Status,
    Output,
    Pong,
}

impl EventKind {
    /// Wire-style name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Identified => "identified",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::Message => "message",
            Self::StreamStart => "stream-start",
            Self::StreamChunk => "stream-chunk",
            Self::StreamComplete => "stream-complete",
            Self::StreamError => "stream-error",
            Self::StreamStopped => "stream-stopped",
            Self::Status => "status",
            Self::Output => "output",
            Self::Pong => "pong",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientEvent {
    /// Which kind of event this is.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Identified { .. } => EventKind::Identified,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::Error { .. } => EventKind::Error,
            Self::Message { .. } => EventKind::Message,
            Self::StreamStart { .. } => EventKind::StreamStart,
            Self::StreamChunk { .. } => EventKind::StreamChunk,
            Self::StreamComplete { .. } => EventKind::StreamComplete,
            Self::StreamError { .. } => EventKind::StreamError,
            Self::StreamStopped { .. } => EventKind::StreamStopped,
            Self::Status { .. } => EventKind::Status,
            Self::Output { .. } => EventKind::Output,
            Self::Pong => EventKind::Pong,
        }
    }
}

/// Handle returned by [`EventHub::on`], used to remove the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Listener registry plus broadcast channel.
pub struct EventHub {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<ClientEvent>,
}

impl EventHub {
    /// Create a hub whose broadcast channel buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register a listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Register a listener for every event.
    pub fn on_any<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    /// Remove a listener. Returns `false` when it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Receive every event asynchronously.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Number of registered synchronous listeners.
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to matching listeners, then to broadcast receivers.
    pub fn emit(&self, event: ClientEvent) {
        let kind = event.kind();
        // Snapshot so handlers can call `on`/`off` without deadlocking.
        let handlers: Vec<Handler> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.kind.is_none_or(|k| k == kind))
            .map(|l| Arc::clone(&l.handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    fn register(&self, kind: Option<EventKind>, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Listener { id, kind, handler });
        id
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}
