//! Test doubles shared by the tool tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    serde_json::Value,
    sigline_history::SqliteHistoryStore,
    sigline_signal::{CommandRunner, Error as SignalError, SignalClient},
    sqlx::sqlite::SqlitePoolOptions,
};

use crate::context::ToolContext;

pub(crate) const ACCOUNT: &str = "+15550000000";

enum Reply {
    Records(Vec<Value>),
    Exit(i32, String),
}

/// Answers signal-cli operations from a script keyed by operation name.
/// Unscripted operations return no records.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<Vec<String>>>,
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

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> sigline_signal::Result<Vec<Value>> {
        self.calls.lock().unwrap().push(args.to_vec());
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

/// A context over an in-memory history and a scripted signal-cli whose
/// `receive` returns `receive`. The temp dir serves as attachments dir.
pub(crate) async fn context(
    receive: Vec<Value>,
) -> (ToolContext, Arc<ScriptedRunner>, tempfile::TempDir) {
    let runner = Arc::new(ScriptedRunner::default());
    runner.reply("receive", receive);

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
    (ctx, runner, dir)
}

/// A signal-cli `receive` record for an incoming direct message.
pub(crate) fn incoming(sender: &str, name: &str, timestamp: i64, body: &str) -> Value {
    serde_json::json!({
        "envelope": {
            "sourceNumber": sender,
            "sourceName": name,
            "timestamp": timestamp,
            "dataMessage": {"timestamp": timestamp, "message": body}
        },
        "account": ACCOUNT
    })
}
