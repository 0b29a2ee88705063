use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use {
    bytes::Bytes,
    dashmap::{DashMap, mapref::entry::Entry},
    serde_json::Value,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::warn,
    uuid::Uuid,
};

use crate::{
    engine::ProtocolEngine,
    sink::{EventSink, SinkError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Open = 0,
    /// Teardown claimed by one caller; no new work is accepted.
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer went away.
    Disconnect,
    /// Pushing to the stream failed.
    WriteFailure,
    /// Server shutdown.
    Shutdown,
    /// `close_session` by id.
    Explicit,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnect => "disconnect",
            Self::WriteFailure => "write_failure",
            Self::Shutdown => "shutdown",
            Self::Explicit => "explicit",
        }
    }
}

/// One open stream and the engine answering on it.
pub struct Session {
    id: String,
    sink: Arc<dyn EventSink>,
    engine: Arc<dyn ProtocolEngine>,
    state: AtomicU8,
    inbound: mpsc::UnboundedSender<Value>,
    cancel: CancellationToken,
    opened_at: Instant,
}

impl Session {
    pub(crate) fn new(
        id: &str,
        sink: Arc<dyn EventSink>,
        engine: Arc<dyn ProtocolEngine>,
        inbound: mpsc::UnboundedSender<Value>,
    ) -> Self {
        Self {
            id: id.to_string(),
            sink,
            engine,
            state: AtomicU8::new(SessionState::Open as u8),
            inbound,
            cancel: CancellationToken::new(),
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn engine(&self) -> Arc<dyn ProtocolEngine> {
        Arc::clone(&self.engine)
    }

    pub(crate) fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue a message for the session worker.
    pub(crate) fn enqueue(&self, message: Value) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        self.inbound.send(message).map_err(|_| SinkError::Closed)
    }

    /// Push a frame, unless teardown has started.
    pub(crate) fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        self.sink.write(chunk)
    }

    /// Claim teardown. Exactly one caller gets `true`.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Stop the worker and end the stream.
    pub(crate) fn finish_close(&self) {
        self.cancel.cancel();
        self.sink.close();
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
    }
}

/// The live session table: every open session, keyed by id.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct SessionTable {
    inner: Arc<DashMap<String, Arc<Session>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Insert a session under a fresh id. `build` runs with the id already
    /// reserved and must not touch the table.
    pub(crate) fn insert_new(&self, build: impl FnOnce(&str) -> Arc<Session>) -> Arc<Session> {
        let mut build = Some(build);
        loop {
            match self.inner.entry(Uuid::new_v4().to_string()) {
                Entry::Vacant(slot) => {
                    let Some(build) = build.take() else {
                        unreachable!("build is consumed only on the vacant path, which returns");
                    };
                    let session = build(slot.key());
                    slot.insert(Arc::clone(&session));
                    return session;
                },
                Entry::Occupied(slot) => {
                    warn!(session_id = %slot.key(), "session id collision, regenerating");
                },
            }
        }
    }

    /// Remove `session`, but only if the table still maps its id to it.
    pub(crate) fn remove(&self, session: &Arc<Session>) -> bool {
        self.inner
            .remove_if(session.id(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }
}
