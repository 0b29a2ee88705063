//! Protocol engines: the per-session side of the tool protocol.
//!
//! The router hands every follow-up payload to [`ProtocolEngine::accept`]
//! synchronously, which decides between answering in the follow-up
//! response itself and queueing the message for [`ProtocolEngine::handle`],
//! whose reply goes down the session's stream.

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    sigline_tools::ToolRegistry,
    tracing::{debug, info, warn},
};

use crate::types::{
    ClientInfo, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, InitializeParams,
    InitializeResult, JsonRpcMessage, JsonRpcResponse, METHOD_NOT_FOUND, McpToolDef,
    PROTOCOL_VERSION, ServerCapabilities, ServerInfo, ToolAnnotations, ToolContent,
    ToolsCallParams, ToolsCallResult, ToolsCapability, ToolsListResult,
};

/// What to do with an accepted follow-up payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Process on the session worker; any reply is pushed down the stream.
    Deferred(Value),
    /// Answer in the follow-up response body.
    Immediate(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("malformed JSON: {0}")]
    Parse(String),
    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait ProtocolEngine: Send + Sync + 'static {
    /// Inspect a raw follow-up payload. Must not block.
    fn accept(&self, payload: &[u8]) -> Result<Inbound, EngineError>;

    /// Process a deferred message. `None` means nothing to send back.
    async fn handle(&self, message: Value) -> Option<Value>;
}

/// Creates one engine per session.
pub trait EngineFactory: Send + Sync {
    fn create(&self, session_id: &str) -> Arc<dyn ProtocolEngine>;
}

// ── MCP engine ──────────────────────────────────────────────────────

/// Identity reported in `initialize`.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

impl Default for ServerIdentity {
    fn default() -> Self {
        Self {
            name: "sigline".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            instructions: None,
        }
    }
}

/// Builds [`McpEngine`]s over a shared tool registry.
pub struct McpEngineFactory {
    registry: Arc<ToolRegistry>,
    identity: Arc<ServerIdentity>,
}

impl McpEngineFactory {
    pub fn new(registry: Arc<ToolRegistry>, identity: ServerIdentity) -> Self {
        Self {
            registry,
            identity: Arc::new(identity),
        }
    }
}

impl EngineFactory for McpEngineFactory {
    fn create(&self, session_id: &str) -> Arc<dyn ProtocolEngine> {
        Arc::new(McpEngine::new(
            session_id,
            Arc::clone(&self.registry),
            Arc::clone(&self.identity),
        ))
    }
}

/// MCP server side of one session: JSON-RPC 2.0 over the tool registry.
pub struct McpEngine {
    session_id: String,
    registry: Arc<ToolRegistry>,
    identity: Arc<ServerIdentity>,
    initialized: AtomicBool,
    client: OnceLock<ClientInfo>,
}

impl McpEngine {
    pub fn new(
        session_id: impl Into<String>,
        registry: Arc<ToolRegistry>,
        identity: Arc<ServerIdentity>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            registry,
            identity,
            initialized: AtomicBool::new(false),
            client: OnceLock::new(),
        }
    }

    /// Whether the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Name the client gave in `initialize`, if any.
    pub fn client_name(&self) -> Option<&str> {
        self.client.get().map(|c| c.name.as_str())
    }

    async fn handle_one(&self, message: Value) -> Option<JsonRpcResponse> {
        let message: JsonRpcMessage = match serde_json::from_value(message) {
            Ok(m) => m,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    INVALID_REQUEST,
                    format!("invalid request: {e}"),
                ));
            },
        };

        let Some(method) = message.method else {
            if let Some(id) = message.id {
                return Some(JsonRpcResponse::failure(
                    id,
                    INVALID_REQUEST,
                    "invalid request: missing method",
                ));
            }
            debug!(session_id = %self.session_id, "ignoring message without method");
            return None;
        };
        if message.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            warn!(session_id = %self.session_id, "unexpected jsonrpc version");
        }

        let Some(id) = message.id else {
            self.notification(&method);
            return None;
        };

        let params = message.params.unwrap_or(Value::Null);
        let response = match method.as_str() {
            "initialize" => self.initialize(params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(params).await,
            other => Err((METHOD_NOT_FOUND, format!("method not found: {other}"))),
        };
        Some(match response {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err((code, message)) => JsonRpcResponse::failure(id, code, message),
        })
    }

    fn notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                self.initialized.store(true, Ordering::Release);
                debug!(session_id = %self.session_id, "client initialized");
            },
            "notifications/cancelled" => {
                // Calls run to completion; their replies are simply late.
                debug!(session_id = %self.session_id, "cancellation ignored");
            },
            other => debug!(session_id = %self.session_id, method = other, "ignoring notification"),
        }
    }

    fn initialize(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params)
                .map_err(|e| (INVALID_PARAMS, format!("invalid initialize params: {e}")))?
        };
        if let Some(client) = params.client_info {
            info!(
                session_id = %self.session_id,
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "mcp session initialized"
            );
            let _ = self.client.set(client);
        }
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.identity.name.clone(),
                version: self.identity.version.clone(),
            },
            instructions: self.identity.instructions.clone(),
        };
        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }

    fn list_tools(&self) -> Value {
        let tools = self
            .registry
            .descriptors()
            .into_iter()
            .map(|d| McpToolDef {
                name: d.name.to_string(),
                description: d.description.to_string(),
                input_schema: d.input_schema,
                annotations: ToolAnnotations {
                    read_only_hint: d.auto_approve,
                    destructive_hint: !d.auto_approve,
                },
            })
            .collect();
        serde_json::to_value(ToolsListResult { tools }).unwrap_or_else(|_| json!({ "tools": [] }))
    }

    async fn call_tool(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: ToolsCallParams = serde_json::from_value(params)
            .map_err(|e| (INVALID_PARAMS, format!("invalid tools/call params: {e}")))?;
        debug!(
            session_id = %self.session_id,
            client = self.client_name().unwrap_or("unknown"),
            tool = %params.name,
            "tools/call"
        );

        let outcome = self.registry.dispatch(&params.name, &params.arguments).await;
        let text = serde_json::to_string_pretty(&outcome.value)
            .unwrap_or_else(|_| outcome.value.to_string());
        let result = ToolsCallResult {
            content: vec![ToolContent::Text { text }],
            is_error: outcome.is_error,
        };
        serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }
}

#[async_trait]
impl ProtocolEngine for McpEngine {
    fn accept(&self, payload: &[u8]) -> Result<Inbound, EngineError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| EngineError::Parse(e.to_string()))?;
        match &value {
            Value::Object(_) => Ok(Inbound::Deferred(value)),
            Value::Array(items) if !items.is_empty() => Ok(Inbound::Deferred(value)),
            Value::Array(_) => Err(EngineError::Rejected("empty batch".into())),
            _ => Err(EngineError::Rejected(
                "expected a JSON-RPC object or batch".into(),
            )),
        }
    }

    async fn handle(&self, message: Value) -> Option<Value> {
        match message {
            Value::Array(items) => {
                let mut replies = Vec::new();
                for item in items {
                    if let Some(reply) = self.handle_one(item).await {
                        replies.push(reply);
                    }
                }
                (!replies.is_empty()).then(|| json!(replies))
            },
            single => self
                .handle_one(single)
                .await
                .and_then(|reply| serde_json::to_value(reply).ok()),
        }
    }
}
