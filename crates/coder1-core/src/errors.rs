//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame text was not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame was JSON but had no string `type` field.
    #[error("frame has no string `type` field")]
    MissingType,

    /// The frame type is known but its fields did not match.
    #[error("invalid `{frame_type}` frame: {source}")]
    InvalidFrame {
        /// The `type` value of the rejected frame.
        frame_type: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// An outbound frame could not be serialized.
    #[error("failed to serialize frame: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err()
    }

    #[test]
    fn malformed_display() {
        let err = ProtocolError::Malformed(json_error());
        assert!(err.to_string().starts_with("malformed frame:"));
    }

    #[test]
    fn missing_type_display() {
        assert_eq!(
            ProtocolError::MissingType.to_string(),
            "frame has no string `type` field"
        );
    }

    #[test]
    fn invalid_frame_display_names_type() {
        let err = ProtocolError::InvalidFrame {
            frame_type: "stream-chunk".into(),
            source: json_error(),
        };
        assert!(err.to_string().contains("`stream-chunk`"));
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;
        let err = ProtocolError::Serialize(json_error());
        assert!(err.source().is_some());
    }
}
