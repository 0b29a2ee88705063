use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::{
    context::ToolContext,
    schema::{Args, ToolSchema},
};

/// A callable operation exposed to assistants.
#[async_trait]
pub trait SignalTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> ToolSchema;

    /// Whether the calling environment may run this without asking the user.
    /// The registry only advertises the flag; enforcement is the caller's.
    fn auto_approve(&self) -> bool {
        true
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value>;
}

/// What a tool looks like from the outside.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub auto_approve: bool,
}

/// Result of one dispatch. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    fn error(message: impl std::fmt::Display) -> Self {
        Self {
            value: json!({ "error": message.to_string(), "success": false }),
            is_error: true,
        }
    }
}

/// Fixed, ordered set of tools sharing one context.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn SignalTool>>,
    ctx: ToolContext,
}

impl ToolRegistry {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            ctx,
        }
    }

    /// Registry with every built-in tool.
    pub fn with_default_tools(ctx: ToolContext) -> Self {
        let mut registry = Self::new(ctx);
        crate::tools::register_all(&mut registry);
        registry
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn SignalTool>) {
        let tool: Arc<dyn SignalTool> = Arc::from(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn SignalTool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name(),
                description: t.description(),
                input_schema: t.schema().to_json_schema(),
                auto_approve: t.auto_approve(),
            })
            .collect()
    }

    /// Validate `args` and run the named tool.
    ///
    /// Unknown names, validation failures and handler errors all come back
    /// as `{"error": "...", "success": false}` with `is_error` set.
    pub async fn dispatch(&self, name: &str, args: &Value) -> ToolOutcome {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let outcome = self.dispatch_inner(name, args).await;

        #[cfg(feature = "metrics")]
        {
            use sigline_metrics::{counter, histogram, labels, tools};
            let tool = if self.get(name).is_some() {
                name.to_string()
            } else {
                "unknown".to_string()
            };
            let result = if outcome.is_error { "error" } else { "ok" };
            counter!(tools::CALLS_TOTAL, labels::TOOL => tool.clone(), labels::OUTCOME => result)
                .increment(1);
            histogram!(tools::DURATION_SECONDS, labels::TOOL => tool)
                .record(started.elapsed().as_secs_f64());
        }

        outcome
    }

    async fn dispatch_inner(&self, name: &str, args: &Value) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "unknown tool");
            return ToolOutcome::error(format!("unknown tool: {name}"));
        };
        let args = match tool.schema().validate(args) {
            Ok(args) => args,
            Err(e) => {
                debug!(tool = name, error = %e, "invalid tool arguments");
                return ToolOutcome::error(e);
            },
        };
        match tool.execute(args, &self.ctx).await {
            Ok(value) => ToolOutcome::ok(value),
            Err(e) => {
                warn!(tool = name, error = %e, "tool failed");
                ToolOutcome::error(format!("{e:#}"))
            },
        }
    }
}
