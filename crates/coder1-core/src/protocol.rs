//! Wire-format frames for the streaming WebSocket protocol.
//!
//! Every frame is a JSON text message discriminated by a `type` field.
//! Outbound frames wrap their fields in a `payload` object; inbound frames
//! carry their fields at the top level.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{ClientId, SessionId, StreamId};

/// Generation parameters sent with a `stream-request`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Model identifier.
    pub model: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Payload of a `stream-request` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// Client-generated stream identifier.
    pub stream_id: StreamId,
    /// Prompt text.
    pub content: String,
    /// Generation parameters.
    pub options: GenerationOptions,
}

/// Payload naming a single stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRef {
    /// Target stream.
    pub stream_id: StreamId,
}

/// Payload naming a single session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    /// Target session.
    pub session_id: SessionId,
}

/// Frame sent from the client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum OutboundFrame {
    /// Start streaming a response.
    StreamRequest(StreamRequest),
    /// Ask the server to stop an in-flight stream.
    StopStream(StreamRef),
    /// Subscribe to a session's status and output.
    Subscribe(SessionRef),
    /// Stop receiving a session's status and output.
    Unsubscribe(SessionRef),
    /// Keep-alive.
    Ping,
}

impl OutboundFrame {
    /// Build a `stream-request` frame.
    pub fn stream_request(
        stream_id: StreamId,
        content: impl Into<String>,
        options: GenerationOptions,
    ) -> Self {
        Self::StreamRequest(StreamRequest {
            stream_id,
            content: content.into(),
            options,
        })
    }

    /// Build a `stop-stream` frame.
    pub fn stop_stream(stream_id: StreamId) -> Self {
        Self::StopStream(StreamRef { stream_id })
    }

    /// Build a `subscribe` frame.
    pub fn subscribe(session_id: SessionId) -> Self {
        Self::Subscribe(SessionRef { session_id })
    }

    /// Build an `unsubscribe` frame.
    pub fn unsubscribe(session_id: SessionId) -> Self {
        Self::Unsubscribe(SessionRef { session_id })
    }

    /// Wire `type` of this frame.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::StreamRequest(_) => "stream-request",
            Self::StopStream(_) => "stop-stream",
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Ping => "ping",
        }
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialize)
    }
}

/// Frame received from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InboundFrame {
    /// Server greeting carrying the assigned client id.
    Connected {
        /// Server-assigned client identifier.
        client_id: ClientId,
    },
    /// The server accepted a stream request and began generating.
    StreamStart {
        /// Stream being started.
        stream_id: StreamId,
    },
    /// One incremental piece of a stream.
    StreamChunk {
        /// Stream the chunk belongs to.
        stream_id: StreamId,
        /// The raw chunk text.
        #[serde(default)]
        content: String,
        /// Server-joined text so far. Authoritative for the stream content.
        #[serde(default)]
        accumulated: Option<String>,
    },
    /// The stream finished successfully.
    StreamComplete {
        /// Finished stream.
        stream_id: StreamId,
        /// Final content.
        #[serde(default)]
        content: Option<String>,
        /// Server-measured duration in milliseconds.
        #[serde(default)]
        duration: Option<u64>,
    },
    /// The stream failed.
    StreamError {
        /// Failed stream.
        stream_id: StreamId,
        /// Error description.
        #[serde(default)]
        error: String,
    },
    /// The stream was stopped at the client's request.
    StreamStopped {
        /// Stopped stream.
        stream_id: StreamId,
    },
    /// Status update for a subscribed session.
    Status {
        /// Session the status belongs to.
        session_id: SessionId,
        /// Status payload.
        #[serde(default)]
        data: Value,
    },
    /// Output produced by a subscribed session.
    Output {
        /// Session the output belongs to.
        session_id: SessionId,
        /// Output payload.
        #[serde(default)]
        output: Value,
    },
    /// Heartbeat acknowledgment.
    Pong,
}

/// Every inbound `type` value this client understands.
pub const KNOWN_INBOUND_TYPES: &[&str] = &[
    "connected",
    "stream-start",
    "stream-chunk",
    "stream-complete",
    "stream-error",
    "stream-stopped",
    "status",
    "output",
    "pong",
];

impl InboundFrame {
    /// Wire `type` of this frame.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::StreamStart { .. } => "stream-start",
            Self::StreamChunk { .. } => "stream-chunk",
            Self::StreamComplete { .. } => "stream-complete",
            Self::StreamError { .. } => "stream-error",
            Self::StreamStopped { .. } => "stream-stopped",
            Self::Status { .. } => "status",
            Self::Output { .. } => "output",
            Self::Pong => "pong",
        }
    }
}

/// Result of decoding one inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A frame of a known type.
    Frame(InboundFrame),
    /// A well-formed frame whose `type` this client does not know.
    Unknown {
        /// The unrecognized `type` value.
        frame_type: String,
    },
}

/// Decode one inbound text frame.
///
/// Returns the raw JSON value alongside the typed result so callers can
/// forward the untouched frame to generic listeners. Unknown types are not
/// an error.
pub fn decode_inbound(text: &str) -> Result<(Value, Inbound), ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ProtocolError::MissingType)?;

    if !KNOWN_INBOUND_TYPES.contains(&frame_type.as_str()) {
        return Ok((value, Inbound::Unknown { frame_type }));
    }

    let frame = serde_json::from_value(value.clone())
        .map_err(|source| ProtocolError::InvalidFrame { frame_type, source })?;
    Ok((value, Inbound::Frame(frame)))
}
