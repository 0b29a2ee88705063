use std::path::Path;

use {
    anyhow::{Context as _, bail},
    async_trait::async_trait,
    serde_json::{Value, json},
};

use crate::{
    context::ToolContext,
    registry::SignalTool,
    schema::{ArgSpec, Args, ToolSchema},
};

/// Resolves a received attachment to its file on disk.
pub struct DownloadMediaTool;

/// `"<timestamp>"` or `"<sender>:<timestamp>"`.
fn parse_message_id(id: &str) -> anyhow::Result<(Option<&str>, i64)> {
    let (sender, ts) = match id.rsplit_once(':') {
        Some((sender, ts)) if !sender.is_empty() => (Some(sender), ts),
        _ => (None, id),
    };
    let timestamp = ts.trim().parse().with_context(|| {
        format!("invalid messageId '{id}': expected <timestamp> or <sender>:<timestamp>")
    })?;
    Ok((sender, timestamp))
}

/// Attachment ids are file names inside the attachments directory.
fn is_plain_file_name(id: &str) -> bool {
    Path::new(id).file_name().and_then(|n| n.to_str()) == Some(id) && id != ".."
}

#[async_trait]
impl SignalTool for DownloadMediaTool {
    fn name(&self) -> &'static str {
        "download_media"
    }

    fn description(&self) -> &'static str {
        "Get the local file path of an attachment from a received Signal message."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            ArgSpec::string(
                "messageId",
                "Message timestamp, or <sender>:<timestamp> when several senders share it",
            )
            .required(),
            ArgSpec::string("attachmentId", "Attachment id from the message's attachments")
                .required(),
        ])
    }

    async fn execute(&self, args: Args, ctx: &ToolContext) -> anyhow::Result<Value> {
        let message_id = args.require_str("messageId")?;
        let attachment_id = args.require_str("attachmentId")?;

        let (sender, timestamp) = parse_message_id(message_id)?;
        let Some(message) = ctx.history.find(timestamp, sender).await? else {
            bail!("message not found: {message_id}");
        };
        let Some(attachment) = message.attachments.iter().find(|a| a.id == attachment_id) else {
            bail!("attachment {attachment_id} not found on message {message_id}");
        };
        if !is_plain_file_name(&attachment.id) {
            bail!("attachment id '{}' is not a file name", attachment.id);
        }

        let path = ctx.attachments_dir.join(&attachment.id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("attachment file not found: {}", path.display());
        }

        Ok(json!({
            "path": path.display().to_string(),
            "contentType": attachment.content_type,
            "filename": attachment.filename,
            "size": attachment.size,
        }))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{registry::ToolRegistry, testing::{ACCOUNT, context}},
        rstest::rstest,
    };

    fn with_attachment(sender: &str, timestamp: i64, id: &str) -> Value {
        json!({
            "envelope": {
                "sourceNumber": sender,
                "timestamp": timestamp,
                "dataMessage": {
                    "timestamp": timestamp,
                    "attachments": [{"id": id, "contentType": "image/jpeg", "size": 3}]
                }
            },
            "account": ACCOUNT
        })
    }

    #[rstest]
    #[case("1700000000000", None, 1_700_000_000_000)]
    #[case("+15551234567:42", Some("+15551234567"), 42)]
    #[case(":42", None, 42)]
    fn parses_message_ids(
        #[case] id: &str,
        #[case] sender: Option<&str>,
        #[case] timestamp: i64,
    ) {
        assert_eq!(parse_message_id(id).unwrap(), (sender, timestamp));
    }

    #[test]
    fn rejects_bad_message_ids() {
        assert!(parse_message_id("yesterday").is_err());
        assert!(parse_message_id("+1:later").is_err());
    }

    #[test]
    fn only_plain_names_resolve() {
        assert!(is_plain_file_name("abc123.jpg"));
        assert!(!is_plain_file_name("../etc/passwd"));
        assert!(!is_plain_file_name("a/b.jpg"));
        assert!(!is_plain_file_name(".."));
    }

    #[tokio::test]
    async fn resolves_existing_attachment() {
        let (ctx, _runner, dir) = context(vec![with_attachment("+100", 7, "abc.jpg")]).await;
        ctx.sync_inbox().await.unwrap();
        std::fs::write(dir.path().join("abc.jpg"), b"jpg").unwrap();

        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch(
                "download_media",
                &json!({"messageId": 7, "attachmentId": "abc.jpg"}),
            )
            .await;
        assert!(!outcome.is_error, "{}", outcome.value);
        assert_eq!(
            outcome.value["path"],
            dir.path().join("abc.jpg").display().to_string()
        );
        assert_eq!(outcome.value["contentType"], "image/jpeg");
    }

    #[rstest]
    #[case(json!({"attachmentId": "abc.jpg"}), "missing required argument: messageId")]
    #[case(json!({"messageId": "7"}), "missing required argument: attachmentId")]
    #[case(json!({"messageId": "8", "attachmentId": "abc.jpg"}), "message not found: 8")]
    #[case(json!({"messageId": "+100:7", "attachmentId": "zzz.png"}), "attachment zzz.png not found on message +100:7")]
    #[tokio::test]
    async fn failures_are_structured(#[case] args: Value, #[case] expected: &str) {
        let (ctx, _runner, _dir) = context(vec![with_attachment("+100", 7, "abc.jpg")]).await;
        ctx.sync_inbox().await.unwrap();
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch("download_media", &args)
            .await;
        assert!(outcome.is_error);
        assert_eq!(outcome.value["error"], expected);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let (ctx, _runner, _dir) = context(vec![with_attachment("+100", 7, "gone.jpg")]).await;
        ctx.sync_inbox().await.unwrap();
        let outcome = ToolRegistry::with_default_tools(ctx)
            .dispatch(
                "download_media",
                &json!({"messageId": "7", "attachmentId": "gone.jpg"}),
            )
            .await;
        assert!(outcome.is_error);
        assert!(
            outcome.value["error"]
                .as_str()
                .unwrap()
                .starts_with("attachment file not found")
        );
    }
}
