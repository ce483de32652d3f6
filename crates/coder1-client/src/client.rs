//! Public client handle.

use std::sync::Arc;
use std::time::Duration;

use coder1_core::{ClientId, GenerationOptions, SessionId, StreamId};
use coder1_settings::{Coder1Settings, StreamSettings};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use url::Url;

use crate::connection::{Command, ConnectionTask};
use crate::dispatcher::Dispatcher;
use crate::endpoint::{Endpoint, resolve_ws_url};
use crate::errors::{ClientError, Result};
use crate::events::{ClientEvent, EventHub, EventKind, ListenerId};
use crate::registry::{
    CompletedStream, StreamCallbacks, StreamChunk, StreamFailure, StreamSnapshot,
};
use crate::state::ConnectionState;

/// Per-stream overrides and callbacks for [`StreamClient::start_stream`].
///
/// Unset generation parameters fall back to the `streams` settings.
#[derive(Debug, Default)]
pub struct StreamOptions {
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    system_prompt: Option<String>,
    callbacks: StreamCallbacks,
}

impl StreamOptions {
    /// No overrides, no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the token limit.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the system prompt.
    #[must_use]
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Called for every chunk, on the connection task.
    #[must_use]
    pub fn on_chunk<F>(mut self, f: F) -> Self
    where
        F: FnMut(&StreamChunk) + Send + 'static,
    {
        self.callbacks.on_chunk = Some(Box::new(f));
        self
    }

    /// Called once when the stream completes.
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&CompletedStream) + Send + 'static,
    {
        self.callbacks.on_complete = Some(Box::new(f));
        self
    }

    /// Called once when the stream fails, is stopped or loses its socket.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&StreamFailure) + Send + 'static,
    {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    fn into_parts(self, defaults: &StreamSettings) -> (GenerationOptions, StreamCallbacks) {
        let base = defaults.generation_options();
        let options = GenerationOptions {
            model: self.model.unwrap_or(base.model),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
            system_prompt: self.system_prompt.or(base.system_prompt),
        };
        (options, self.callbacks)
    }
}

/// Handle to one multiplexed WebSocket connection.
///
/// Cheap to clone. The connection task stops and the socket closes when the
/// last clone is dropped. Must be created inside a tokio runtime.
#[derive(Clone, Debug)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    hub: Arc<EventHub>,
    client_id: Arc<RwLock<Option<ClientId>>>,
    defaults: StreamSettings,
    url: Url,
}

impl StreamClient {
    /// Create a client for `endpoint` and spawn its connection task.
    /// Nothing is opened until [`connect`](Self::connect).
    pub fn new(settings: &Coder1Settings, endpoint: Endpoint) -> Result<Self> {
        let url = resolve_ws_url(&settings.connection, endpoint)?;
        let hub = Arc::new(EventHub::new(settings.events.capacity));
        let client_id = Arc::new(RwLock::new(None));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let task = ConnectionTask::new(
            url.clone(),
            settings.connection.clone(),
            settings.streams.completion_grace(),
            state_tx,
            Dispatcher::new(Arc::clone(&hub), Arc::clone(&client_id)),
            commands.downgrade(),
        );
        let _ = tokio::spawn(task.run(command_rx));

        Ok(Self {
            commands,
            state: state_rx,
            hub,
            client_id,
            defaults: settings.streams.clone(),
            url,
        })
    }

    /// Client for the `/ws/streaming` endpoint.
    pub fn streaming(settings: &Coder1Settings) -> Result<Self> {
        Self::new(settings, Endpoint::Streaming)
    }

    /// Client for the `/ws/infinite-loop` endpoint.
    pub fn infinite_loop(settings: &Coder1Settings) -> Result<Self> {
        Self::new(settings, Endpoint::InfiniteLoop)
    }

    /// Socket URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open the socket. Returns immediately when already connected.
    ///
    /// A failed open is returned here and also goes through the reconnect
    /// path, so a retry may already be scheduled when this returns.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.map_err(|_| ClientError::TaskClosed)?
    }

    /// Close the socket, forget subscriptions, fail in-flight streams and
    /// suppress reconnects until the next [`connect`](Self::connect).
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply })?;
        rx.await.map_err(|_| ClientError::TaskClosed)
    }

    /// Request a streamed response. Fails with
    /// [`ClientError::NotConnected`] when the socket is not open.
    pub fn start_stream(
        &self,
        content: impl Into<String>,
        options: StreamOptions,
    ) -> Result<StreamId> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected {
                operation: "start stream",
            });
        }
        let stream_id = StreamId::generate();
        let (options, callbacks) = options.into_parts(&self.defaults);
        self.send(Command::StartStream {
            stream_id: stream_id.clone(),
            content: content.into(),
            options,
            callbacks,
        })?;
        Ok(stream_id)
    }

    /// Start a stream and wait for its final content.
    ///
    /// Callbacks already set on `options` still run.
    pub async fn collect_stream(
        &self,
        content: impl Into<String>,
        mut options: StreamOptions,
    ) -> Result<CompletedStream> {
        let (tx, rx) = oneshot::channel::<Result<CompletedStream>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let user_complete = options.callbacks.on_complete.take();
        let done_tx = Arc::clone(&tx);
        options.callbacks.on_complete = Some(Box::new(move |done: &CompletedStream| {
            if let Some(f) = user_complete {
                f(done);
            }
            if let Some(tx) = done_tx.lock().take() {
                let _ = tx.send(Ok(done.clone()));
            }
        }));

        let user_error = options.callbacks.on_error.take();
        options.callbacks.on_error = Some(Box::new(move |failure: &StreamFailure| {
            if let Some(f) = user_error {
                f(failure);
            }
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(Err(ClientError::StreamFailed {
                    stream_id: failure.stream_id.clone(),
                    reason: failure.reason.clone(),
                }));
            }
        }));

        let _ = self.start_stream(content, options)?;
        rx.await.map_err(|_| ClientError::TaskClosed)?
    }

    /// Ask the server to stop a stream. Local state is cleared when the
    /// server confirms with `stream-stopped`.
    pub fn stop_stream(&self, stream_id: &StreamId) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected {
                operation: "stop stream",
            });
        }
        self.send(Command::StopStream {
            stream_id: stream_id.clone(),
        })
    }

    /// Subscribe to a session. While disconnected the subscription is
    /// remembered and sent on the next successful open.
    pub fn subscribe(&self, session_id: impl Into<SessionId>) -> Result<()> {
        self.send(Command::Subscribe {
            session_id: session_id.into(),
        })
    }

    /// Unsubscribe from a session.
    pub fn unsubscribe(&self, session_id: impl Into<SessionId>) -> Result<()> {
        self.send(Command::Unsubscribe {
            session_id: session_id.into(),
        })
    }

    /// Send a `ping` frame. Send failures are logged, not returned.
    pub fn ping(&self) -> Result<()> {
        self.send(Command::Ping)
    }

    /// Register a listener for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.hub.on(kind, handler)
    }

    /// Register a listener for every event.
    pub fn on_any<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.hub.on_any(handler)
    }

    /// Remove a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.hub.off(id)
    }

    /// Receive every event asynchronously.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.hub.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Wait until the state satisfies `pred`, up to `within`.
    /// Returns `None` on timeout.
    pub async fn wait_for_state<F>(&self, pred: F, within: Duration) -> Option<ConnectionState>
    where
        F: Fn(ConnectionState) -> bool,
    {
        let mut rx = self.state.clone();
        match tokio::time::timeout(within, rx.wait_for(|s| pred(*s))).await {
            Ok(Ok(state)) => Some(*state),
            _ => None,
        }
    }

    /// Server-assigned id from the last `connected` frame.
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id.read().clone()
    }

    /// Snapshot of a registered stream.
    pub async fn stream(&self, stream_id: &StreamId) -> Result<Option<StreamSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::QueryStream {
            stream_id: stream_id.clone(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::TaskClosed)
    }

    /// Currently subscribed sessions.
    pub async fn subscriptions(&self) -> Result<Vec<SessionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::QuerySubscriptions { reply })?;
        rx.await.map_err(|_| ClientError::TaskClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::TaskClosed)
    }
}
