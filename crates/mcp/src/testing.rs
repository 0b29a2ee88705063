//! Test doubles for the router, stdio loop and engine tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    bytes::Bytes,
    http::{HeaderName, HeaderValue},
    serde_json::{Value, json},
    sigline_history::SqliteHistoryStore,
    sigline_signal::{CommandRunner, Error as SignalError, SignalClient},
    sigline_tools::{ToolContext, ToolRegistry},
    sqlx::sqlite::SqlitePoolOptions,
    tokio_util::sync::CancellationToken,
};

use crate::{
    engine::{EngineError, EngineFactory, Inbound, ProtocolEngine},
    sink::{EventSink, SinkError},
};

pub(crate) const ACCOUNT: &str = "+15550000000";

// ── Sink ────────────────────────────────────────────────────────────

/// Records everything written to it. `disconnect` plays the peer going away.
#[derive(Default)]
pub(crate) struct RecordingSink {
    headers: Mutex<Vec<(HeaderName, HeaderValue)>>,
    chunks: Mutex<Vec<Bytes>>,
    streaming: AtomicBool,
    fail_writes: AtomicBool,
    closed: CancellationToken,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose response has already started, so headers are refused.
    pub(crate) fn already_streaming() -> Arc<Self> {
        let sink = Self::default();
        sink.streaming.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disconnect(&self) {
        self.closed.cancel();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.to_str().unwrap().to_string())
    }

    pub(crate) fn text(&self) -> String {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    /// Complete frames, without their trailing blank line.
    pub(crate) fn frames(&self) -> Vec<String> {
        self.text()
            .split("\n\n")
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Payloads of every `message` event, parsed.
    pub(crate) fn messages(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .filter_map(|f| f.strip_prefix("event: message\ndata: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    /// Wait until at least `count` frames have arrived.
    pub(crate) async fn wait_for_frames(&self, count: usize) -> Vec<String> {
        eventually(|| self.frames().len() >= count).await;
        self.frames()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn set_header(&self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError> {
        if self.streaming.load(Ordering::SeqCst) {
            return Err(SinkError::HeadersSent);
        }
        self.headers.lock().unwrap().push((name, value));
        Ok(())
    }

    fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        if self.closed.is_cancelled() || self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.streaming.store(true, Ordering::SeqCst);
        self.chunks.lock().unwrap().push(chunk);
        Ok(())
    }

    fn close(&self) {
        self.closed.cancel();
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

/// Poll `condition` until it holds; panics after five seconds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Replies `{"echo": <message>}` after the message's `delayMs`.
///
/// `{"sync": true}` is answered immediately, `{"silent": true}` gets no
/// reply and anything but an object is rejected.
pub(crate) struct EchoEngine;

#[async_trait]
impl ProtocolEngine for EchoEngine {
    fn accept(&self, payload: &[u8]) -> Result<Inbound, EngineError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| EngineError::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(EngineError::Rejected("expected an object".into()));
        }
        if value["sync"] == true {
            return Ok(Inbound::Immediate(json!({ "echo": value })));
        }
        Ok(Inbound::Deferred(value))
    }

    async fn handle(&self, message: Value) -> Option<Value> {
        if let Some(ms) = message["delayMs"].as_u64() {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if message["silent"] == true {
            return None;
        }
        Some(json!({ "echo": message }))
    }
}

pub(crate) struct EchoFactory;

impl EngineFactory for EchoFactory {
    fn create(&self, _session_id: &str) -> Arc<dyn ProtocolEngine> {
        Arc::new(EchoEngine)
    }
}

// ── Tools ───────────────────────────────────────────────────────────

enum Reply {
    Records(Vec<Value>),
    Exit(i32, String),
}

/// Answers signal-cli operations from a script keyed by operation name.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    replies: Mutex<HashMap<String, Reply>>,
}

impl ScriptedRunner {
    pub(crate) fn reply(&self, operation: &str, records: Vec<Value>) {
        self.replies
            .lock()
            .unwrap()
            .insert(operation.into(), Reply::Records(records));
    }

    pub(crate) fn fail(&self, operation: &str, code: i32, stderr: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(operation.into(), Reply::Exit(code, stderr.into()));
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> sigline_signal::Result<Vec<Value>> {
        let operation = args.first().cloned().unwrap_or_default();
        match self.replies.lock().unwrap().get(&operation) {
            Some(Reply::Records(records)) => Ok(records.clone()),
            Some(Reply::Exit(code, stderr)) => Err(SignalError::ExitStatus {
                code: *code,
                stderr: stderr.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// The default tool registry over in-memory history and a scripted signal-cli.
pub(crate) async fn registry() -> (Arc<ToolRegistry>, Arc<ScriptedRunner>, tempfile::TempDir) {
    let runner = Arc::new(ScriptedRunner::default());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sigline_history::run_migrations(&pool).await.unwrap();
    let history = Arc::new(SqliteHistoryStore::with_pool(pool));

    let dir = tempfile::tempdir().unwrap();
    let client = SignalClient::new(runner.clone(), ACCOUNT);
    let ctx = ToolContext::new(client, history, dir.path());
    (Arc::new(ToolRegistry::with_default_tools(ctx)), runner, dir)
}
