//! Connection task.
//!
//! One task per client owns the socket, the stream registry, the subscribed
//! session set and the reconnect tracker. The public handle talks to it
//! through an unbounded command channel; nothing else mutates client state.
//!
//! The loop multiplexes four sources: commands, socket frames, the
//! reconnect deadline and the heartbeat interval. Sources that are inactive
//! (no socket, nothing scheduled, heartbeat disabled) are parked on a
//! pending future so `select!` never wakes for them.

use std::time::Duration;

use coder1_core::{GenerationOptions, OutboundFrame, SessionId, StreamId};
use coder1_settings::ConnectionSettings;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;

use crate::dispatcher::Dispatcher;
use crate::errors::{ClientError, Result};
use crate::events::{ClientEvent, EventHub};
use crate::registry::{StreamCallbacks, StreamSnapshot};
use crate::state::{ConnectionState, ReconnectTracker};
use crate::subscriptions::SessionSubscriptions;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketItem = Option<std::result::Result<Message, tungstenite::Error>>;

/// Requests from the handle to the connection task.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    StartStream {
        stream_id: StreamId,
        content: String,
        options: GenerationOptions,
        callbacks: StreamCallbacks,
    },
    StopStream {
        stream_id: StreamId,
    },
    Subscribe {
        session_id: SessionId,
    },
    Unsubscribe {
        session_id: SessionId,
    },
    Ping,
    /// Completion grace window elapsed.
    Expire {
        stream_id: StreamId,
    },
    QueryStream {
        stream_id: StreamId,
        reply: oneshot::Sender<Option<StreamSnapshot>>,
    },
    QuerySubscriptions {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
}

/// State owned by the connection task.
pub(crate) struct ConnectionTask {
    url: Url,
    settings: ConnectionSettings,
    completion_grace: Duration,
    socket: Option<WsStream>,
    state: watch::Sender<ConnectionState>,
    tracker: ReconnectTracker,
    reconnect_at: Option<Instant>,
    heartbeat: Option<Interval>,
    dispatcher: Dispatcher,
    subscriptions: SessionSubscriptions,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl ConnectionTask {
    pub(crate) fn new(
        url: Url,
        settings: ConnectionSettings,
        completion_grace: Duration,
        state: watch::Sender<ConnectionState>,
        dispatcher: Dispatcher,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let tracker = ReconnectTracker::new(settings.max_reconnect_attempts);
        Self {
            url,
            settings,
            completion_grace,
            socket: None,
            state,
            tracker,
            reconnect_at: None,
            heartbeat: None,
            dispatcher,
            subscriptions: SessionSubscriptions::new(),
            commands,
        }
    }

    /// Run until every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                }
                item = next_socket_item(&mut self.socket) => {
                    self.handle_socket_item(item).await;
                }
                () = reconnect_due(self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!(url = %self.url, attempt = self.tracker.attempts(), "reconnecting");
                    // Failures are already reported through events.
                    let _ = self.open().await;
                }
                () = heartbeat_tick(&mut self.heartbeat) => {
                    self.ping().await;
                }
            }
        }
        let registry = self.dispatcher.registry();
        if registry.is_empty() {
            debug!(url = %self.url, "all client handles dropped, shutting down");
        } else {
            debug!(
                url = %self.url,
                streams = registry.len(),
                "all client handles dropped, discarding registered streams"
            );
        }
        self.close_socket().await;
    }

    fn hub(&self) -> &EventHub {
        self.dispatcher.hub()
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send_replace(state);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = if self.socket.is_some() {
                    Ok(())
                } else {
                    self.reconnect_at = None;
                    self.open().await
                };
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::StartStream {
                stream_id,
                content,
                options,
                callbacks,
            } => self.start_stream(stream_id, content, options, callbacks).await,
            Command::StopStream { stream_id } => {
                if !self.dispatcher.registry().contains(&stream_id) {
                    warn!(stream_id = %stream_id, "stop requested for unknown stream");
                    return;
                }
                if let Err(error) = self.send(&OutboundFrame::stop_stream(stream_id.clone())).await {
                    warn!(stream_id = %stream_id, %error, "failed to send stop-stream");
                }
            }
            Command::Subscribe { session_id } => {
                let _ = self.subscriptions.insert(session_id.clone());
                if self.socket.is_some() {
                    if let Err(error) = self.send(&OutboundFrame::subscribe(session_id.clone())).await {
                        warn!(session_id = %session_id, %error, "failed to send subscribe");
                    }
                } else {
                    debug!(session_id = %session_id, "subscription queued until connected");
                }
            }
            Command::Unsubscribe { session_id } => {
                let _ = self.subscriptions.remove(&session_id);
                if self.socket.is_some() {
                    if let Err(error) = self.send(&OutboundFrame::unsubscribe(session_id.clone())).await {
                        warn!(session_id = %session_id, %error, "failed to send unsubscribe");
                    }
                }
            }
            Command::Ping => self.ping().await,
            Command::Expire { stream_id } => {
                if self.dispatcher.registry_mut().expire(&stream_id) {
                    debug!(stream_id = %stream_id, "completed stream expired");
                }
            }
            Command::QueryStream { stream_id, reply } => {
                let _ = reply.send(self.dispatcher.registry().snapshot(&stream_id));
            }
            Command::QuerySubscriptions { reply } => {
                let _ = reply.send(self.subscriptions.to_vec());
            }
        }
    }

    async fn open(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        info!(url = %self.url, "connecting");

        let attempt = timeout(self.settings.connect_timeout(), connect_async(self.url.as_str())).await;
        let socket = match attempt {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                let error = ClientError::ConnectFailed {
                    url: self.url.to_string(),
                    reason: e.to_string(),
                };
                warn!(url = %self.url, %error, "connection failed");
                self.connection_lost(&error.to_string(), Some(error.to_string()));
                return Err(error);
            }
            Err(_) => {
                let error = ClientError::ConnectTimeout {
                    url: self.url.to_string(),
                    timeout_ms: self.settings.connect_timeout_ms,
                };
                warn!(url = %self.url, %error, "connection timed out");
                self.connection_lost(&error.to_string(), Some(error.to_string()));
                return Err(error);
            }
        };

        self.socket = Some(socket);
        self.tracker.reset();
        self.reconnect_at = None;
        self.heartbeat = self.settings.heartbeat_interval().map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        info!(url = %self.url, "connected");
        self.hub().emit(ClientEvent::Connected {
            url: self.url.to_string(),
        });
        self.resubscribe_all().await;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) {
        let was_idle =
            self.socket.is_none() && *self.state.borrow() == ConnectionState::Disconnected;
        self.tracker.suppress();
        self.reconnect_at = None;
        self.subscriptions.clear();
        self.dispatcher.fail_in_flight("client disconnected");
        self.close_socket().await;
        if !was_idle {
            info!(url = %self.url, "disconnected by client");
            self.hub().emit(ClientEvent::Disconnected {
                reason: "client disconnect".into(),
            });
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Unexpected close, transport error or failed open.
    ///
    /// Events go out before the state changes so anyone waiting on the
    /// state sees the complete event sequence.
    fn connection_lost(&mut self, reason: &str, error: Option<String>) {
        self.socket = None;
        self.heartbeat = None;
        if let Some(message) = error {
            self.hub().emit(ClientEvent::Error { message });
        }
        self.dispatcher.fail_in_flight("connection lost");
        let next = self.tracker.after_failure();
        self.hub().emit(ClientEvent::Disconnected {
            reason: reason.to_owned(),
        });
        match next {
            ConnectionState::ReconnectScheduled { attempt } => {
                let delay = self.settings.reconnect_interval();
                let max_attempts = self.tracker.max_attempts();
                info!(
                    url = %self.url,
                    attempt,
                    max_attempts,
                    delay_ms = self.settings.reconnect_interval_ms,
                    "reconnect scheduled"
                );
                self.hub().emit(ClientEvent::Reconnecting {
                    attempt,
                    max_attempts,
                });
                self.reconnect_at = Some(Instant::now() + delay);
            }
            _ => {
                self.reconnect_at = None;
                warn!(
                    url = %self.url,
                    max_attempts = self.tracker.max_attempts(),
                    "reconnect attempts exhausted"
                );
            }
        }
        self.set_state(next);
    }

    async fn handle_socket_item(&mut self, item: SocketItem) {
        match item {
            Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => self.dispatch(text),
                Err(_) => warn!(len = data.len(), "dropping non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Ping(payload))) => {
                if let Some(socket) = self.socket.as_mut() {
                    if let Err(error) = socket.send(Message::Pong(payload)).await {
                        debug!(%error, "failed to answer transport ping");
                    }
                }
            }
            Some(Ok(Message::Pong(_))) => debug!("transport pong"),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "server closed connection".to_owned(),
                    |f| format!("server closed connection ({}): {}", u16::from(f.code), f.reason.as_str()),
                );
                info!(url = %self.url, %reason, "socket closed");
                self.connection_lost(&reason, None);
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                let message = e.to_string();
                warn!(url = %self.url, error = %message, "socket error");
                self.connection_lost(&format!("WebSocket error: {message}"), Some(message));
            }
            None => {
                info!(url = %self.url, "socket stream ended");
                self.connection_lost("socket stream ended", None);
            }
        }
    }

    fn dispatch(&mut self, text: &str) {
        if let Some(stream_id) = self.dispatcher.handle_text(text) {
            self.schedule_expiry(stream_id);
        }
    }

    /// Remove a completed entry after the grace window. The timer holds a
    /// weak sender, so it never keeps the task alive.
    fn schedule_expiry(&self, stream_id: StreamId) {
        let commands = self.commands.clone();
        let grace = self.completion_grace;
        let _ = tokio::spawn(async move {
            sleep(grace).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Expire { stream_id });
            }
        });
    }

    async fn start_stream(
        &mut self,
        stream_id: StreamId,
        content: String,
        options: GenerationOptions,
        callbacks: StreamCallbacks,
    ) {
        let frame = OutboundFrame::stream_request(stream_id.clone(), content.clone(), options.clone());
        if let Err(error) =
            self.dispatcher
                .registry_mut()
                .register(stream_id.clone(), content, options, callbacks)
        {
            warn!(stream_id = %stream_id, %error, "stream not started");
            return;
        }
        debug!(stream_id = %stream_id, "sending stream request");
        if let Err(error) = self.send(&frame).await {
            self.dispatcher.fail_stream(&stream_id, &error.to_string());
        }
    }

    async fn resubscribe_all(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        info!(count = self.subscriptions.len(), "re-subscribing sessions");
        for session_id in self.subscriptions.to_vec() {
            if let Err(error) = self.send(&OutboundFrame::subscribe(session_id.clone())).await {
                warn!(session_id = %session_id, %error, "re-subscribe failed");
            }
        }
    }

    async fn ping(&mut self) {
        if let Err(error) = self.send(&OutboundFrame::Ping).await {
            debug!(%error, "ping not sent");
        }
    }

    async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        let frame_type = frame.frame_type();
        let Some(socket) = self.socket.as_mut() else {
            return Err(ClientError::NotConnected {
                operation: frame_type,
            });
        };
        let text = frame.to_json()?;
        socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::SendFailed {
                frame_type,
                reason: e.to_string(),
            })
    }

    async fn close_socket(&mut self) {
        self.heartbeat = None;
        if let Some(mut socket) = self.socket.take() {
            if let Err(error) = socket.close(None).await {
                debug!(%error, "close handshake failed");
            }
        }
    }
}

async fn next_socket_item(socket: &mut Option<WsStream>) -> SocketItem {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_sources_never_fire() {
        let mut socket = None;
        let mut heartbeat = None;
        tokio::select! {
            _ = next_socket_item(&mut socket) => panic!("no socket"),
            () = reconnect_due(None) => panic!("nothing scheduled"),
            () = heartbeat_tick(&mut heartbeat) => panic!("heartbeat disabled"),
            () = sleep(Duration::from_secs(3600)) => {}
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_deadline_fires() {
        let deadline = Instant::now() + Duration::from_millis(3000);
        reconnect_due(Some(deadline)).await;
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_after_one_period() {
        let start = Instant::now();
        let period = Duration::from_secs(30);
        let mut heartbeat = Some(interval_at(start + period, period));
        heartbeat_tick(&mut heartbeat).await;
        assert!(Instant::now() >= start + period);
    }
}
