//! Error-context plumbing and small utilities shared by the sigline crates.

pub mod error;
pub mod time;

pub use error::FromMessage;
