//! Gateway: the HTTP binding of the sigline session transport.
//!
//! Lifecycle:
//! 1. Build collaborators from config (history store, signal-cli client, tools)
//! 2. Start the retention task
//! 3. Serve the stream-open, follow-up, health and metrics routes
//! 4. On shutdown, close every session so open streams end
//!
//! Session bookkeeping and the protocol itself live in `sigline-mcp`; this
//! crate only adapts them to axum.

#[cfg(feature = "metrics")]
pub mod metrics_middleware;
#[cfg(feature = "prometheus")]
pub mod metrics_routes;
pub mod retention;
pub mod server;
pub mod services;
pub mod sink;
pub mod state;

pub use {
    server::{AppState, build_gateway_app, start_gateway},
    services::GatewayServices,
    state::GatewayState,
};
