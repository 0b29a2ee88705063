//! Metrics for sigline.
//!
//! Crates record through the `metrics` facade macros re-exported here, using
//! the names in [`definitions`]. Nothing is collected until [`init_metrics`]
//! installs a recorder; with the `prometheus` feature the gateway renders the
//! collected values on `/metrics`.
//!
//! ```rust,ignore
//! use sigline_metrics::{counter, session};
//!
//! counter!(session::OPENED_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
