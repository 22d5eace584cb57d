//! Codec error types.

use thiserror::Error;

use crate::events::EventKind;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was not valid JSON or not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame had no top-level `event` string.
    #[error("frame has no 'event' field")]
    MissingEvent,
    /// A handler asked for the payload of an event that carried none.
    #[error("event '{0}' carries no payload")]
    MissingPayload(EventKind),
    /// The payload did not match the shape expected for its event.
    #[error("invalid payload for '{kind}': {source}")]
    InvalidPayload {
        /// The event whose payload failed.
        kind: EventKind,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing an outbound command failed.
    #[error("failed to encode '{event}': {source}")]
    Encode {
        /// Wire name of the command.
        event: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_payload_display() {
        let err = CodecError::MissingPayload(EventKind::KeyDown);
        assert_eq!(err.to_string(), "event 'keyDown' carries no payload");
    }

    #[test]
    fn malformed_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err = CodecError::Malformed(json_err);
        assert!(err.to_string().starts_with("malformed frame"));
    }
}
