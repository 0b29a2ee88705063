//! [`EventSink`] over an axum streaming body.
//!
//! Writes go into a bounded channel that the response body drains. A peer
//! that stays connected but stops reading fills it, and the next write fails
//! with [`SinkError::Backlogged`] so the session is torn down. When hyper
//! drops the body (the client went away or the connection failed) the sink
//! observes it through [`EventSink::closed`].

use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use {
    async_trait::async_trait,
    bytes::Bytes,
    futures::Stream,
    http::{HeaderMap, HeaderName, HeaderValue},
    sigline_mcp::{EventSink, SinkError},
    tokio::sync::mpsc::{self, error::TrySendError},
    tokio_util::sync::CancellationToken,
};

/// Frames buffered for a peer before it counts as stalled.
pub const DEFAULT_BUFFER_FRAMES: usize = 256;

pub struct ChannelSink {
    headers: Mutex<HeaderMap>,
    streaming: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    gone: CancellationToken,
}

impl ChannelSink {
    /// A sink and the body stream that delivers what is written to it.
    pub fn new() -> (Self, BodyStream) {
        Self::with_capacity(DEFAULT_BUFFER_FRAMES)
    }

    pub fn with_capacity(frames: usize) -> (Self, BodyStream) {
        let (tx, rx) = mpsc::channel(frames.max(1));
        let gone = CancellationToken::new();
        let sink = Self {
            headers: Mutex::new(HeaderMap::new()),
            streaming: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            gone: gone.clone(),
        };
        (sink, BodyStream { rx, gone })
    }

    /// Headers set so far.
    pub fn headers(&self) -> HeaderMap {
        self.headers
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn set_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError> {
        if self.streaming.load(Ordering::Acquire) {
            return Err(SinkError::HeadersSent);
        }
        let mut headers = self.headers.lock().map_err(|_| SinkError::Closed)?;
        headers.insert(name, value);
        Ok(())
    }

    fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        let tx = self.tx.lock().map_err(|_| SinkError::Closed)?;
        let Some(tx) = tx.as_ref() else {
            return Err(SinkError::Closed);
        };
        self.streaming.store(true, Ordering::Release);
        tx.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Backlogged,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn close(&self) {
        // Dropping the sender ends the body once buffered frames drain.
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        self.gone.cancel();
    }

    async fn closed(&self) {
        self.gone.cancelled().await;
    }
}

/// Response body for one event stream. Dropping it marks the sink closed.
pub struct BodyStream {
    rx: mpsc::Receiver<Bytes>,
    gone: CancellationToken,
}

impl Stream for BodyStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.gone.cancel();
    }
}
