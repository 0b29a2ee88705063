//! Built-in tools, registered in the order clients see them.

mod chats;
mod media;
mod messages;
mod send;

pub use {
    chats::{GetRecentChatsTool, ListChatsTool},
    media::DownloadMediaTool,
    messages::{GetMessagesTool, ReceiveMessagesTool, SearchMessagesTool},
    send::SendMessageTool,
};

use crate::registry::ToolRegistry;

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Box::new(GetMessagesTool));
    registry.register(Box::new(ReceiveMessagesTool));
    registry.register(Box::new(ListChatsTool));
    registry.register(Box::new(GetRecentChatsTool));
    registry.register(Box::new(SearchMessagesTool));
    registry.register(Box::new(DownloadMediaTool));
    registry.register(Box::new(SendMessageTool));
}
