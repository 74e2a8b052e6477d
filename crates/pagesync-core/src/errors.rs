//! Protocol decode errors and handler failures.

/// A frame received from a client could not be turned into a [`ClientMessage`].
///
/// [`ClientMessage`]: crate::messages::ClientMessage
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame must be a JSON array of [event, ...args]")]
    NotAnArray,

    #[error("frame is empty")]
    EmptyFrame,

    #[error("event name must be a string")]
    InvalidEventName,

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("malformed {event} payload: {source}")]
    MalformedPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnArray => "not_an_array",
            Self::EmptyFrame => "empty_frame",
            Self::InvalidEventName => "invalid_event_name",
            Self::UnknownEvent(_) => "unknown_event",
            Self::MalformedPayload { .. } => "malformed_payload",
        }
    }
}

/// Failure raised by a page handler or auth predicate.
///
/// Any variant returned from a lifecycle or custom-event handler aborts the
/// rest of that inbound message and triggers a reset for its pages.
#[derive(Clone, Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}
