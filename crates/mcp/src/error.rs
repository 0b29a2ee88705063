use {http::StatusCode, sigline_common::FromMessage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error("{message}")]
    Message { message: String },
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

sigline_common::impl_context!();

/// Why a stream-open or follow-up request could not be routed.
///
/// These are the only failures that surface as HTTP statuses; everything
/// past routing is answered inside the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("sessionId query parameter is required")]
    MissingSessionId,

    /// Never issued, already closed, or malformed. Deliberately one variant
    /// so a closed session is indistinguishable from an unknown one.
    #[error("unknown or expired session")]
    SessionNotFound,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("event stream unavailable: {0}")]
    StreamUnavailable(String),
}

impl RouteError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingSessionId | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::StreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the error body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSessionId => "missing_session_id",
            Self::SessionNotFound => "session_not_found",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::StreamUnavailable(_) => "stream_unavailable",
        }
    }

    /// `{"error": {"code": "...", "message": "..."}}`
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
