use {
    async_trait::async_trait,
    serde_json::{Value, json},
};

use crate::{
    context::ToolContext,
    registry::SignalTool,
    schema::{ArgSpec, Args, ToolSchema},
};

/// Contacts and groups known to signal-cli.
pub struct ListChatsTool;

#[async_trait]
impl SignalTool for ListChatsTool {
    fn name(&self) -> &'static str {
        "list_chats"
    }

    fn description(&self) -> &'static str {
        "List Signal contacts and groups this account can message."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::empty()
    }

    async fn execute(&self, _args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let chats = ctx.client.list_chats().await?;
        Ok(serde_json::to_value(chats)?)
    }
}

/// Conversations ordered by latest activity, from stored history.
pub struct GetRecentChatsTool;

#[async_trait]
impl SignalTool for GetRecentChatsTool {
    fn name(&self) -> &'static str {
        "get_recent_chats"
    }

    fn description(&self) -> &'static str {
        "List recent Signal conversations with their last message and unread count, most recent first."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ArgSpec::integer("limit", "Maximum number of conversations")
                .range(1, 100)
                .default_value(json!(20)),
        ])
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let summaries = ctx.history.chat_summaries(args.limit("limit", 20)).await?;
        Ok(serde_json::to_value(summaries)?)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{registry::ToolRegistry, testing::{context, incoming}},
    };

    #[tokio::test]
    async fn list_chats_merges_contacts_and_groups() {
        let (ctx, runner, _dir) = context(Vec::new()).await;
        runner.reply(
            "listContacts",
            vec![json!({"number": "+15551234567", "name": "Alice"})],
        );
        runner.reply(
            "listGroups",
            vec![json!({"id": "R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==", "name": "Climbing"})],
        );
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch("list_chats", &Value::Null)
            .await;
        assert!(!outcome.is_error);
        assert_eq!(
            outcome.value,
            json!([
                {"contact": "+15551234567", "contactName": "Alice", "isGroup": false},
                {"contact": "R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==", "isGroup": true, "groupName": "Climbing"}
            ])
        );
    }

    #[tokio::test]
    async fn recent_chats_are_limited_and_sorted() {
        let (ctx, _runner, _dir) = context(vec![
            incoming("+100", "A", 10, "a"),
            incoming("+200", "B", 30, "b"),
            incoming("+300", "C", 20, "c"),
        ])
        .await;
        ctx.sync_inbox().await.unwrap();
        let registry = ToolRegistry::with_default_tools(ctx);

        let outcome = registry
            .dispatch("get_recent_chats", &json!({"limit": 2}))
            .await;
        let chats = outcome.value.as_array().unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0]["contact"], "+200");
        assert_eq!(chats[1]["contact"], "+300");
        assert_eq!(chats[0]["unreadCount"], 1);

        let all = registry.dispatch("get_recent_chats", &json!({})).await;
        let stamps: Vec<_> = all
            .value
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["lastMessageTimestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(stamps, vec![30, 20, 10]);
    }

    #[tokio::test]
    async fn recent_chats_limit_is_bounded() {
        let (ctx, _runner, _dir) = context(Vec::new()).await;
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch("get_recent_chats", &json!({"limit": 101}))
            .await;
        assert!(outcome.is_error);
    }
}
