use {
    anyhow::anyhow,
    async_trait::async_trait,
    serde_json::{Value, json},
    tracing::warn,
};

use {
    sigline_records::NormalizedMessage,
    sigline_signal::RecipientKind,
};

use crate::{
    context::ToolContext,
    registry::SignalTool,
    schema::{ArgSpec, Args, ToolSchema},
};

/// Sends a text message. Never auto-approved.
pub struct SendMessageTool;

#[async_trait]
impl SignalTool for SendMessageTool {
    fn name(&self) -> &'static str {
        "send_message"
    }

    fn description(&self) -> &'static str {
        "Send a Signal message to a phone number or group id. \
         Requires explicit user approval."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ArgSpec::string("recipient", "Phone number (+15551234567) or group id").required(),
            ArgSpec::string("message", "Text to send").required(),
            ArgSpec::string(
                "recipientType",
                "Whether the recipient is a person or a group; guessed from the address when omitted",
            )
            .one_of(&["individual", "group"]),
        ])
    }

    fn auto_approve(&self) -> bool {
        false
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let recipient = args.require_str("recipient")?.trim();
        let message = args.require_str("message")?;
        let kind = args
            .str("recipientType")
            .map(str::parse::<RecipientKind>)
            .transpose()
            .map_err(|e| anyhow!(e))?;

        let receipt = ctx.client.send(recipient, message, kind).await?;

        let is_group = receipt.kind == RecipientKind::Group;
        let sent = NormalizedMessage {
            sender: ctx.account().to_string(),
            sender_name: None,
            timestamp: receipt.timestamp,
            body: Some(message.to_string()),
            attachments: Vec::new(),
            is_group,
            group_id: is_group.then(|| recipient.to_string()),
            group_name: None,
            recipient: Some(recipient.to_string()),
        };
        // The message is out either way; a history miss only costs recall.
        if let Err(e) = ctx.history.insert(&sent).await {
            warn!(error = %e, "failed to record sent message");
        }

        Ok(json!({ "success": true, "timestamp": receipt.timestamp }))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{registry::ToolRegistry, testing::context},
        sigline_history::RecentQuery,
    };

    #[tokio::test]
    async fn successful_send_reports_timestamp_and_is_recorded() {
        let (ctx, runner, _dir) = context(Vec::new()).await;
        runner.reply("send", vec![json!({"timestamp": 1_700_000_000_555_i64})]);
        let history = ctx.history.clone();

        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch(
                "send_message",
                &json!({"recipient": "+15551234567", "message": "hi"}),
            )
            .await;
        assert_eq!(
            outcome.value,
            json!({"success": true, "timestamp": 1_700_000_000_555_i64})
        );
        assert!(!outcome.is_error);

        let stored = history
            .recent(&RecentQuery {
                limit: 10,
                contact: Some("+15551234567".into()),
                since: None,
            })
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].recipient.as_deref(), Some("+15551234567"));
        assert_eq!(history.stats().await.unwrap().unread, 0);
    }

    #[tokio::test]
    async fn failed_send_is_structured_error() {
        let (ctx, runner, _dir) = context(Vec::new()).await;
        runner.fail("send", 1, "Unregistered user");
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch(
                "send_message",
                &json!({"recipient": "+15551234567", "message": "hi"}),
            )
            .await;
        assert!(outcome.is_error);
        assert_eq!(outcome.value["success"], false);
        let error = outcome.value["error"].as_str().unwrap();
        assert!(!error.is_empty());
        assert!(error.contains("Unregistered user"));
    }

    #[tokio::test]
    async fn explicit_group_type_uses_group_flag() {
        let (ctx, runner, _dir) = context(Vec::new()).await;
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch(
                "send_message",
                &json!({"recipient": "c2hvcnQ=", "message": "hi", "recipientType": "group"}),
            )
            .await;
        assert!(!outcome.is_error, "{}", outcome.value);
        assert_eq!(runner.calls()[0], vec!["send", "-m", "hi", "-g", "c2hvcnQ="]);
    }

    #[tokio::test]
    async fn missing_message_never_reaches_signal_cli() {
        let (ctx, runner, _dir) = context(Vec::new()).await;
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch("send_message", &json!({"recipient": "+15551234567"}))
            .await;
        assert!(outcome.is_error);
        assert!(runner.calls().is_empty());
    }
}
