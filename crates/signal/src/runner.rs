use std::{process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    serde_json::Value,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Something that runs a signal-cli operation and returns its JSON records.
///
/// `args` are the operation-specific arguments (`receive --timeout 5`,
/// `listContacts`, ...). Implementations add the account and output mode.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<Vec<Value>>;
}

/// Runs the real signal-cli binary as a subprocess.
#[derive(Debug, Clone)]
pub struct SignalCliRunner {
    program: String,
    account: String,
    timeout: Duration,
}

impl SignalCliRunner {
    pub fn new(program: impl Into<String>, account: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            account: account.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    async fn invoke(&self, args: &[String]) -> Result<Vec<Value>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-a")
            .arg(&self.account)
            .arg("--output=json")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the process down too.
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| Error::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    operation = args.first().map(String::as_str).unwrap_or_default(),
                    timeout_ms = self.timeout_ms(),
                    "signal-cli timed out"
                );
                return Err(Error::Timeout {
                    timeout_ms: self.timeout_ms(),
                });
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::ExitStatus {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let records = parse_output(&stdout);
        debug!(
            operation = args.first().map(String::as_str).unwrap_or_default(),
            stdout_len = stdout.len(),
            records = records.len(),
            "signal-cli done"
        );
        Ok(records)
    }
}

#[async_trait]
impl CommandRunner for SignalCliRunner {
    async fn run(&self, args: &[String]) -> Result<Vec<Value>> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.invoke(args).await;

        #[cfg(feature = "metrics")]
        {
            use sigline_metrics::{counter, histogram, labels, signal_cli};
            let command = args.first().cloned().unwrap_or_default();
            counter!(signal_cli::INVOCATIONS_TOTAL, labels::COMMAND => command.clone())
                .increment(1);
            histogram!(signal_cli::DURATION_SECONDS, labels::COMMAND => command.clone())
                .record(started.elapsed().as_secs_f64());
            if let Err(e) = &result {
                counter!(
                    signal_cli::FAILURES_TOTAL,
                    labels::COMMAND => command,
                    labels::KIND => e.kind()
                )
                .increment(1);
            }
        }

        result
    }
}

/// Decode signal-cli's JSON-lines output.
///
/// Each non-blank line is parsed on its own. A line holding a JSON array
/// contributes its elements (some commands print one array instead of one
/// object per line). Lines that fail to parse are logged and dropped.
pub fn parse_output(stdout: &str) -> Vec<Value> {
    let mut records = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(items)) => records.extend(items),
            Ok(value) => records.push(value),
            Err(e) => {
                warn!(error = %e, line_len = line.len(), "dropping unparsable signal-cli output line");
                #[cfg(feature = "metrics")]
                sigline_metrics::counter!(sigline_metrics::signal_cli::DROPPED_LINES_TOTAL)
                    .increment(1);
            },
        }
    }
    records
}
