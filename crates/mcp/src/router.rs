//! Session-addressed routing: one long-lived outbound stream per session,
//! follow-up requests matched to it by id.
//!
//! Each session gets a worker task that owns its queue and processes
//! messages strictly in arrival order. The worker is the only writer of
//! replies; follow-up requests never wait for processing, they are
//! acknowledged once the message is queued.

use std::{sync::Arc, time::Duration};

use {
    http::StatusCode,
    serde_json::Value,
    tokio::{
        sync::mpsc,
        time::{Instant, MissedTickBehavior},
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    engine::{EngineFactory, Inbound},
    error::RouteError,
    session::{CloseReason, Session, SessionTable},
    sink::{EventSink, SinkError, frame, sse_headers},
};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Path clients post follow-ups to, e.g. `/message`.
    pub message_path: String,
    /// Absolute base prepended to the advertised endpoint. Relative when unset.
    pub public_url: Option<String>,
    /// Interval between keep-alive comments on idle streams.
    pub keepalive: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            message_path: "/message".into(),
            public_url: None,
            keepalive: Duration::from_secs(15),
        }
    }
}

impl RouterConfig {
    /// The follow-up address advertised to the client of session `id`.
    pub fn endpoint_for(&self, id: &str) -> String {
        let base = self
            .public_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or_default();
        format!(
            "{base}{}?sessionId={}",
            self.message_path,
            urlencoding::encode(id)
        )
    }
}

/// How a routed follow-up was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteReply {
    /// Queued; any reply arrives on the session's stream.
    Accepted,
    /// Answered in the follow-up response itself.
    Immediate(Value),
}

impl RouteReply {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Accepted => StatusCode::ACCEPTED,
            Self::Immediate(_) => StatusCode::OK,
        }
    }
}

pub struct SessionRouter {
    sessions: SessionTable,
    engines: Arc<dyn EngineFactory>,
    config: RouterConfig,
}

impl SessionRouter {
    pub fn new(config: RouterConfig, engines: Arc<dyn EngineFactory>) -> Self {
        Self::with_table(config, engines, SessionTable::new())
    }

    /// Router over an existing table, e.g. one shared with a health endpoint.
    pub fn with_table(
        config: RouterConfig,
        engines: Arc<dyn EngineFactory>,
        sessions: SessionTable,
    ) -> Self {
        Self {
            sessions,
            engines,
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Open a session on `sink`: set the stream headers, register the
    /// session, announce its follow-up endpoint as the first frame and
    /// start its worker. Must be called from within a tokio runtime.
    pub fn open_session(&self, sink: Arc<dyn EventSink>) -> Result<String, RouteError> {
        for (name, value) in sse_headers() {
            sink.set_header(name, value)
                .map_err(|e| record_route_error(RouteError::StreamUnavailable(e.to_string())))?;
        }

        let (inbound, queue) = mpsc::unbounded_channel();
        let session = self.sessions.insert_new(|id| {
            Arc::new(Session::new(
                id,
                Arc::clone(&sink),
                self.engines.create(id),
                inbound,
            ))
        });

        let endpoint = self.config.endpoint_for(session.id());
        if let Err(e) = session.write(frame::event("endpoint", &endpoint)) {
            warn!(session_id = %session.id(), error = %e, "failed to announce endpoint");
            session.begin_close();
            self.sessions.remove(&session);
            session.finish_close();
            return Err(record_route_error(RouteError::StreamUnavailable(
                e.to_string(),
            )));
        }

        #[cfg(feature = "metrics")]
        {
            use sigline_metrics::{counter, gauge, session as m};
            counter!(m::OPENED_TOTAL).increment(1);
            gauge!(m::ACTIVE).increment(1.0);
        }
        info!(session_id = %session.id(), %endpoint, "session opened");

        let id = session.id().to_string();
        tokio::spawn(run_worker(
            self.sessions.clone(),
            session,
            queue,
            self.config.keepalive,
        ));
        Ok(id)
    }

    /// Route one follow-up payload to its session.
    ///
    /// The session id is checked before the payload is looked at, so a bad
    /// payload for an unknown session is still `SessionNotFound`.
    pub fn route_request(
        &self,
        session_id: Option<&str>,
        payload: &[u8],
    ) -> Result<RouteReply, RouteError> {
        let id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| record_route_error(RouteError::MissingSessionId))?;
        let session = self
            .sessions
            .get(id)
            .filter(|s| s.is_open())
            .ok_or_else(|| record_route_error(RouteError::SessionNotFound))?;

        let reply = match session.engine().accept(payload) {
            Ok(Inbound::Immediate(value)) => RouteReply::Immediate(value),
            Ok(Inbound::Deferred(message)) => {
                session
                    .enqueue(message)
                    .map_err(|_| record_route_error(RouteError::SessionNotFound))?;
                RouteReply::Accepted
            },
            Err(e) => {
                debug!(session_id = id, error = %e, "rejected follow-up payload");
                return Err(record_route_error(RouteError::InvalidPayload(
                    e.to_string(),
                )));
            },
        };

        #[cfg(feature = "metrics")]
        {
            use sigline_metrics::{counter, session as m};
            counter!(m::REQUESTS_TOTAL).increment(1);
        }
        Ok(reply)
    }

    /// Close a session by id. `false` when it was unknown or already closing.
    pub fn close_session(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(session) => close(&self.sessions, &session, CloseReason::Explicit),
            None => false,
        }
    }

    /// Close every live session. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let closed = self
            .sessions
            .snapshot()
            .iter()
            .filter(|session| close(&self.sessions, session, CloseReason::Shutdown))
            .count();
        if closed > 0 {
            info!(closed, "closed all sessions");
        }
        closed
    }
}

fn record_route_error(e: RouteError) -> RouteError {
    #[cfg(feature = "metrics")]
    {
        use sigline_metrics::{counter, labels, session as m};
        counter!(m::ROUTE_ERRORS_TOTAL, labels::CODE => e.code()).increment(1);
    }
    e
}

/// Tear a session down once. Every path to closing goes through here.
fn close(table: &SessionTable, session: &Arc<Session>, reason: CloseReason) -> bool {
    if !session.begin_close() {
        return false;
    }
    table.remove(session);
    session.finish_close();

    #[cfg(feature = "metrics")]
    {
        use sigline_metrics::{counter, gauge, labels, session as m};
        counter!(m::CLOSED_TOTAL, labels::REASON => reason.as_str()).increment(1);
        gauge!(m::ACTIVE).decrement(1.0);
    }
    info!(
        session_id = %session.id(),
        reason = reason.as_str(),
        age_ms = session.age().as_millis() as u64,
        "session closed"
    );
    true
}

// ── Worker ──────────────────────────────────────────────────────────

async fn run_worker(
    table: SessionTable,
    session: Arc<Session>,
    mut queue: mpsc::UnboundedReceiver<Value>,
    keepalive: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let cancelled = session.cancel_token().cancelled();
    tokio::pin!(cancelled);
    let peer_gone = session.sink().closed();
    tokio::pin!(peer_gone);

    // `None` means someone else already closed the session.
    let reason = 'worker: loop {
        tokio::select! {
            biased;
            () = &mut cancelled => break None,
            () = &mut peer_gone => break Some(CloseReason::Disconnect),
            message = queue.recv() => {
                let Some(message) = message else {
                    break None;
                };
                let engine = session.engine();
                let mut task = tokio::spawn(async move { engine.handle(message).await });
                // Dropping the handle on teardown detaches the task; its
                // reply is never written. Keep-alives continue meanwhile.
                let joined = loop {
                    tokio::select! {
                        biased;
                        () = &mut cancelled => break 'worker None,
                        () = &mut peer_gone => break 'worker Some(CloseReason::Disconnect),
                        joined = &mut task => break joined,
                        _ = ticker.tick() => {
                            if let Err(e) = send_keepalive(&session) {
                                debug!(session_id = %session.id(), error = %e, "keepalive write failed");
                                break 'worker Some(CloseReason::WriteFailure);
                            }
                        },
                    }
                };
                match joined {
                    Ok(Some(reply)) => {
                        if let Err(e) = session.write(frame::event("message", &reply.to_string())) {
                            debug!(session_id = %session.id(), error = %e, "reply write failed");
                            break Some(CloseReason::WriteFailure);
                        }
                    },
                    Ok(None) => {},
                    Err(e) => {
                        error!(session_id = %session.id(), error = %e, "message handler panicked");
                    },
                }
                ticker.reset();
            },
            _ = ticker.tick() => {
                if let Err(e) = send_keepalive(&session) {
                    debug!(session_id = %session.id(), error = %e, "keepalive write failed");
                    break Some(CloseReason::WriteFailure);
                }
            },
        }
    };

    if let Some(reason) = reason {
        close(&table, &session, reason);
    }
}

fn send_keepalive(session: &Session) -> Result<(), SinkError> {
    session.write(frame::comment("keepalive"))
}
