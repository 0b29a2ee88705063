//! The tool surface sigline exposes to assistants.
//!
//! Each tool declares its arguments once ([`schema`]); the [`ToolRegistry`]
//! validates calls against that declaration, runs the handler and turns any
//! failure into a structured `{"error": ..., "success": false}` result so
//! nothing a handler does can fault the transport.

pub mod context;
pub mod registry;
pub mod schema;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    context::ToolContext,
    registry::{SignalTool, ToolDescriptor, ToolOutcome, ToolRegistry},
    schema::{ArgSpec, ArgType, Args, ToolSchema, ValidationError},
};
