//! The session-addressed MCP transport for sigline.
//!
//! - [`router`]: one outbound event stream per session, follow-ups routed by id
//! - [`engine`]: MCP over JSON-RPC 2.0, backed by the tool registry
//! - [`sink`]: the minimal interface a streaming response must provide
//! - [`stdio`]: the same engine over stdin/stdout

pub mod engine;
pub mod error;
pub mod router;
pub mod session;
pub mod sink;
pub mod stdio;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    engine::{
        EngineError, EngineFactory, Inbound, McpEngine, McpEngineFactory, ProtocolEngine,
        ServerIdentity,
    },
    error::{Error, Result, RouteError},
    router::{RouteReply, RouterConfig, SessionRouter},
    session::{CloseReason, Session, SessionState, SessionTable},
    sink::{EventSink, SinkError, frame, sse_headers},
    stdio::{serve, serve_stdio},
};
