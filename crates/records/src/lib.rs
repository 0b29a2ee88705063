//! Record transform: signal-cli JSON records in, normalized results out.
//!
//! - `raw`: the shapes signal-cli prints with `--output=json`
//! - `types`: the platform-agnostic results handed to tools and the history store
//! - `normalize`: pure conversions between the two

pub mod normalize;
pub mod raw;
pub mod types;

pub use {
    normalize::{chat_from_contact, chat_from_group, message_from_envelope, messages_from_records},
    types::{Attachment, ChatEntry, ChatSummary, NormalizedMessage},
};
