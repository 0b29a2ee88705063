//! The narrow surface the router needs from a streaming response.
//!
//! Any transport binding (an axum body, a test recorder) implements
//! [`EventSink`]; the router never sees a concrete HTTP framework.

use {
    async_trait::async_trait,
    bytes::Bytes,
    http::{HeaderName, HeaderValue, header},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("headers can no longer be changed once streaming has started")]
    HeadersSent,
    #[error("stream is closed")]
    Closed,
    #[error("peer is not reading; outbound buffer is full")]
    Backlogged,
}

/// Write side of one long-lived outbound stream.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Set a response header. Fails after the first [`EventSink::write`].
    fn set_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError>;

    /// Queue a chunk for the peer. Never blocks; fails once the stream is
    /// closed by either side or the peer has stopped draining it.
    fn write(&self, chunk: Bytes) -> Result<(), SinkError>;

    /// End the stream. Idempotent.
    fn close(&self);

    /// Resolves once the peer has gone away or [`EventSink::close`] ran.
    async fn closed(&self);
}

/// Headers every event stream is opened with.
pub fn sse_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        ),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        // Keeps nginx-style proxies from buffering the stream.
        (
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        ),
    ]
}

/// Server-sent events framing.
pub mod frame {
    use bytes::Bytes;

    /// `event: <name>` followed by one `data:` line per line of `data`.
    pub fn event(name: &str, data: &str) -> Bytes {
        let mut out = String::with_capacity(name.len() + data.len() + 16);
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');
        Bytes::from(out)
    }

    /// A comment line, ignored by SSE parsers. Used for keep-alives.
    pub fn comment(text: &str) -> Bytes {
        Bytes::from(format!(": {text}\n\n"))
    }
}
