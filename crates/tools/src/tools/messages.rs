use std::collections::BTreeSet;

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use {sigline_history::RecentQuery, sigline_records::NormalizedMessage};

use crate::{
    context::ToolContext,
    registry::SignalTool,
    schema::{ArgSpec, Args, ToolSchema},
};

const DEFAULT_LIMIT: u32 = 50;

fn message_filter_args() -> Vec<ArgSpec> {
    vec![
        ArgSpec::integer("limit", "Maximum number of messages to return")
            .range(1, 500)
            .default_value(json!(DEFAULT_LIMIT)),
        ArgSpec::string(
            "contact",
            "Only messages with this contact: phone number, group id or display name",
        ),
        ArgSpec::timestamp(
            "since",
            "Only messages at or after this time (milliseconds since epoch or RFC 3339)",
        ),
    ]
}

/// Whether `message` belongs to the conversation named by `contact`.
fn involves(message: &NormalizedMessage, contact: &str) -> bool {
    message.sender == contact
        || message.recipient.as_deref() == Some(contact)
        || message.group_id.as_deref() == Some(contact)
        || message
            .sender_name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(contact))
}

/// Stored history, refreshed from signal-cli first.
pub struct GetMessagesTool;

#[async_trait]
impl SignalTool for GetMessagesTool {
    fn name(&self) -> &'static str {
        "get_messages"
    }

    fn description(&self) -> &'static str {
        "Get recent Signal messages, newest first, optionally for one contact or group. \
         Reading one contact's messages marks them as read."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(message_filter_args())
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        // Stored history is still worth returning when signal-cli is down.
        if let Err(e) = ctx.sync_inbox().await {
            warn!(error = %e, "inbox sync failed, serving stored history");
        }

        let contact = args.str("contact").map(str::to_string);
        let messages = ctx
            .history
            .recent(&RecentQuery {
                limit: args.limit("limit", DEFAULT_LIMIT),
                contact: contact.clone(),
                since: args.int("since"),
            })
            .await?;

        if contact.is_some() {
            let conversations: BTreeSet<&str> = messages
                .iter()
                .filter(|m| !m.is_outgoing())
                .map(NormalizedMessage::conversation)
                .collect();
            for address in conversations {
                let marked = ctx.history.mark_read(address).await?;
                debug!(address, marked, "marked conversation read");
            }
        }

        Ok(serde_json::to_value(messages)?)
    }
}

/// Fresh messages straight from signal-cli.
pub struct ReceiveMessagesTool;

#[async_trait]
impl SignalTool for ReceiveMessagesTool {
    fn name(&self) -> &'static str {
        "receive_messages"
    }

    fn description(&self) -> &'static str {
        "Fetch new Signal messages that arrived since the last check, newest first. \
         Received messages are also saved to local history."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(message_filter_args())
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let mut messages = ctx.sync_inbox().await?;
        if let Some(contact) = args.str("contact") {
            messages.retain(|m| involves(m, contact));
        }
        if let Some(since) = args.int("since") {
            messages.retain(|m| m.timestamp >= since);
        }
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(args.limit("limit", DEFAULT_LIMIT) as usize);
        Ok(serde_json::to_value(messages)?)
    }
}

/// Case-insensitive search over stored history.
pub struct SearchMessagesTool;

#[async_trait]
impl SignalTool for SearchMessagesTool {
    fn name(&self) -> &'static str {
        "search_messages"
    }

    fn description(&self) -> &'static str {
        "Search stored Signal messages by text, sender number or sender name (case-insensitive)."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ArgSpec::string("query", "Text to look for").required(),
            ArgSpec::string("contact", "Only search messages with this contact or group"),
            ArgSpec::integer("limit", "Maximum number of matches")
                .range(1, 500)
                .default_value(json!(DEFAULT_LIMIT)),
        ])
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = args.require_str("query")?;
        let hits = ctx
            .history
            .search(query, args.str("contact"), args.limit("limit", DEFAULT_LIMIT))
            .await?;
        Ok(serde_json::to_value(hits)?)
    }
}
