//! Client error types.

use coder1_core::{ProtocolError, StreamId};
use thiserror::Error;

/// Errors returned by [`StreamClient`](crate::StreamClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The operation needs an open socket and there is none.
    #[error("cannot {operation}: not connected")]
    NotConnected {
        /// The operation that was refused.
        operation: &'static str,
    },

    /// Opening the socket failed.
    #[error("failed to connect to {url}: {reason}")]
    ConnectFailed {
        /// Target URL.
        url: String,
        /// Transport error text.
        reason: String,
    },

    /// Opening the socket did not finish in time.
    #[error("timed out after {timeout_ms}ms connecting to {url}")]
    ConnectTimeout {
        /// Target URL.
        url: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The configured or derived WebSocket URL is unusable.
    #[error("invalid WebSocket URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Writing a frame to the socket failed.
    #[error("failed to send {frame_type} frame: {reason}")]
    SendFailed {
        /// Wire type of the frame.
        frame_type: &'static str,
        /// Transport error text.
        reason: String,
    },

    /// The connection task has stopped.
    #[error("connection task is not running")]
    TaskClosed,

    /// A stream ended with an error or was stopped.
    #[error("stream {stream_id} failed: {reason}")]
    StreamFailed {
        /// The failed stream.
        stream_id: StreamId,
        /// Server-reported error or stop reason.
        reason: String,
    },

    /// A stream with this id is already registered.
    #[error("stream {0} is already registered")]
    DuplicateStream(StreamId),

    /// Frame encoding or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_display() {
        let err = ClientError::NotConnected {
            operation: "start stream",
        };
        assert_eq!(err.to_string(), "cannot start stream: not connected");
    }

    #[test]
    fn connect_failed_display() {
        let err = ClientError::ConnectFailed {
            url: "ws://localhost:3000/ws/streaming".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("ws://localhost:3000/ws/streaming"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn timeout_display() {
        let err = ClientError::ConnectTimeout {
            url: "ws://h/ws".into(),
            timeout_ms: 1500,
        };
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn send_failed_display() {
        let err = ClientError::SendFailed {
            frame_type: "stream-request",
            reason: "broken pipe".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to send stream-request frame: broken pipe"
        );
    }

    #[test]
    fn stream_failed_display() {
        let err = ClientError::StreamFailed {
            stream_id: "stream_1_a".into(),
            reason: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "stream stream_1_a failed: rate limited");
    }

    #[test]
    fn protocol_error_converts() {
        let err: ClientError = ProtocolError::MissingType.into();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::MissingType)));
        assert_eq!(err.to_string(), "frame has no string `type` field");
    }
}
