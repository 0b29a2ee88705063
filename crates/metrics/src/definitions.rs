//! Metric name and label definitions.
//!
//! Every metric sigline emits is named here so the full set is documented in
//! one place.

/// Session transport metrics
pub mod session {
    /// Streams opened (sessions created)
    pub const OPENED_TOTAL: &str = "sigline_sessions_opened_total";
    /// Sessions closed, labelled by `reason`
    pub const CLOSED_TOTAL: &str = "sigline_sessions_closed_total";
    /// Currently open sessions
    pub const ACTIVE: &str = "sigline_sessions_active";
    /// Follow-up requests rejected by the router, labelled by `code`
    pub const ROUTE_ERRORS_TOTAL: &str = "sigline_route_errors_total";
    /// Follow-up requests accepted for processing
    pub const REQUESTS_TOTAL: &str = "sigline_session_requests_total";
}

/// HTTP surface metrics
pub mod http {
    /// Requests, labelled by `endpoint`, `method` and `status`
    pub const REQUESTS_TOTAL: &str = "sigline_http_requests_total";
    /// Time to produce response headers in seconds. For event streams this
    /// is the time to open, not the stream lifetime.
    pub const REQUEST_DURATION_SECONDS: &str = "sigline_http_request_duration_seconds";
}

/// Tool registry metrics
pub mod tools {
    /// Tool invocations, labelled by `tool` and `outcome`
    pub const CALLS_TOTAL: &str = "sigline_tool_calls_total";
    /// Tool execution duration in seconds
    pub const DURATION_SECONDS: &str = "sigline_tool_duration_seconds";
}

/// signal-cli subprocess metrics
pub mod signal_cli {
    /// Invocations, labelled by `command`
    pub const INVOCATIONS_TOTAL: &str = "sigline_signal_cli_invocations_total";
    /// Failures, labelled by `kind` (timeout, exit, spawn)
    pub const FAILURES_TOTAL: &str = "sigline_signal_cli_failures_total";
    /// Wall time of one invocation in seconds
    pub const DURATION_SECONDS: &str = "sigline_signal_cli_duration_seconds";
    /// Output lines dropped because they were not valid JSON
    pub const DROPPED_LINES_TOTAL: &str = "sigline_signal_cli_dropped_lines_total";
}

/// History store metrics
pub mod history {
    /// Messages newly stored (duplicates excluded)
    pub const INSERTED_TOTAL: &str = "sigline_history_inserted_total";
    /// Messages evicted by retention
    pub const PRUNED_TOTAL: &str = "sigline_history_pruned_total";
}

/// Common label keys
pub mod labels {
    pub const REASON: &str = "reason";
    pub const CODE: &str = "code";
    pub const TOOL: &str = "tool";
    pub const OUTCOME: &str = "outcome";
    pub const COMMAND: &str = "command";
    pub const KIND: &str = "kind";
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
}

/// Histogram buckets
pub mod buckets {
    /// Subprocess and tool durations, 10ms to 2 minutes
    pub const COMMAND_DURATION: &[f64] = &[
        0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
    ];
}
