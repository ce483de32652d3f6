//! Inbound frame routing.
//!
//! Every parsed frame is first emitted untouched as a `message` event, then
//! routed by type: stream frames update the registry and fire per-stream
//! callbacks, session frames become `status`/`output` events. Malformed and
//! unknown frames are logged and dropped.

use std::sync::Arc;

use coder1_core::{ClientId, Inbound, InboundFrame, StreamId, decode_inbound};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::events::{ClientEvent, EventHub};
use crate::registry::{StreamFailure, StreamRegistry};

/// Applies inbound frames to the registry and emits events.
#[derive(Debug)]
pub struct Dispatcher {
    registry: StreamRegistry,
    hub: Arc<EventHub>,
    client_id: Arc<RwLock<Option<ClientId>>>,
}

impl Dispatcher {
    /// Create a dispatcher emitting into `hub` and recording the server
    /// assigned id into `client_id`.
    pub fn new(hub: Arc<EventHub>, client_id: Arc<RwLock<Option<ClientId>>>) -> Self {
        Self {
            registry: StreamRegistry::new(),
            hub,
            client_id,
        }
    }

    /// Stream registry.
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Mutable stream registry.
    pub fn registry_mut(&mut self) -> &mut StreamRegistry {
        &mut self.registry
    }

    /// Event hub.
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Handle one text frame.
    ///
    /// Returns the id of a stream that just completed, whose entry must be
    /// expired after the grace window.
    pub fn handle_text(&mut self, text: &str) -> Option<StreamId> {
        let (raw, inbound) = match decode_inbound(text) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(%error, "dropping malformed frame");
                return None;
            }
        };
        self.hub.emit(ClientEvent::Message { frame: raw });
        match inbound {
            Inbound::Frame(frame) => self.handle_frame(frame),
            Inbound::Unknown { frame_type } => {
                warn!(frame_type = %frame_type, "ignoring unknown frame type");
                None
            }
        }
    }

    /// Route one decoded frame. See [`handle_text`](Self::handle_text).
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Option<StreamId> {
        match frame {
            InboundFrame::Connected { client_id } => {
                info!(client_id = %client_id, "server assigned client id");
                *self.client_id.write() = Some(client_id.clone());
                self.hub.emit(ClientEvent::Identified { client_id });
            }
            InboundFrame::StreamStart { stream_id } => {
                if self.registry.mark_started(&stream_id) {
                    debug!(stream_id = %stream_id, "stream started");
                } else {
                    debug!(stream_id = %stream_id, "stream-start for untracked stream");
                }
                self.hub.emit(ClientEvent::StreamStart { stream_id });
            }
            InboundFrame::StreamChunk {
                stream_id,
                content,
                accumulated,
            } => {
                let event = match self
                    .registry
                    .apply_chunk(&stream_id, &content, accumulated.clone())
                {
                    Some(update) => ClientEvent::StreamChunk {
                        stream_id: update.stream_id,
                        chunk: update.chunk,
                        accumulated: update.accumulated,
                    },
                    None => ClientEvent::StreamChunk {
                        stream_id,
                        chunk: content,
                        accumulated: accumulated.unwrap_or_default(),
                    },
                };
                self.hub.emit(event);
            }
            InboundFrame::StreamComplete {
                stream_id,
                content,
                duration,
            } => {
                if let Some(done) = self
                    .registry
                    .complete(&stream_id, content.clone(), duration)
                {
                    info!(stream_id = %stream_id, duration_ms = done.duration_ms, "stream complete");
                    self.hub.emit(ClientEvent::StreamComplete {
                        stream_id: done.stream_id,
                        content: done.content,
                        duration_ms: Some(done.duration_ms),
                    });
                    return Some(stream_id);
                }
                self.hub.emit(ClientEvent::StreamComplete {
                    stream_id,
                    content: content.unwrap_or_default(),
                    duration_ms: duration,
                });
            }
            InboundFrame::StreamError { stream_id, error } => {
                if self.registry.fail(&stream_id, &error).is_some() {
                    warn!(stream_id = %stream_id, error = %error, "stream failed");
                }
                self.hub.emit(ClientEvent::StreamError { stream_id, error });
            }
            InboundFrame::StreamStopped { stream_id } => {
                if self.registry.stopped(&stream_id).is_some() {
                    info!(stream_id = %stream_id, "stream stopped");
                }
                self.hub.emit(ClientEvent::StreamStopped { stream_id });
            }
            InboundFrame::Status { session_id, data } => {
                self.hub.emit(ClientEvent::Status { session_id, data });
            }
            InboundFrame::Output { session_id, output } => {
                self.hub.emit(ClientEvent::Output { session_id, output });
            }
            InboundFrame::Pong => {
                debug!("pong");
                self.hub.emit(ClientEvent::Pong);
            }
        }
        None
    }

    /// Fail one stream locally, e.g. when its request could not be sent.
    pub fn fail_stream(&mut self, stream_id: &StreamId, reason: &str) {
        if let Some(failure) = self.registry.fail(stream_id, reason) {
            self.emit_failure(failure);
        }
    }

    /// Fail every in-flight stream.
    pub fn fail_in_flight(&mut self, reason: &str) {
        for failure in self.registry.fail_all(reason) {
            self.emit_failure(failure);
        }
    }

    fn emit_failure(&self, failure: StreamFailure) {
        warn!(stream_id = %failure.stream_id, reason = %failure.reason, "stream failed locally");
        self.hub.emit(ClientEvent::StreamError {
            stream_id: failure.stream_id,
            error: failure.reason,
        });
    }
}
