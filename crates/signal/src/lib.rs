//! Adapter for the signal-cli command-line client.
//!
//! [`SignalCliRunner`] spawns `<binary> -a <account> --output=json <args>`
//! under a time budget and decodes its JSON-lines stdout. [`SignalClient`]
//! issues the operations sigline needs on top of any [`CommandRunner`] and
//! hands back normalized records.

pub mod client;
pub mod error;
pub mod recipient;
pub mod runner;

pub use {
    client::{SendReceipt, SignalClient},
    error::{Error, Result},
    recipient::RecipientKind,
    runner::{CommandRunner, SignalCliRunner, parse_output},
};
