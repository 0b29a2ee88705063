use std::sync::Arc;

use {
    serde_json::Value,
    tracing::{debug, info},
};

use {
    sigline_common::time::now_ms,
    sigline_records::{
        ChatEntry, NormalizedMessage, chat_from_contact, chat_from_group, messages_from_records,
        raw::{Contact, Group, SendRecord},
    },
};

use crate::{
    error::{Error, Result},
    recipient::RecipientKind,
    runner::CommandRunner,
};

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReceipt {
    /// Timestamp signal-cli assigned to the sent message, or the local clock
    /// when it did not report one.
    pub timestamp: i64,
    pub kind: RecipientKind,
}

/// High-level signal-cli operations for one account.
#[derive(Clone)]
pub struct SignalClient {
    runner: Arc<dyn CommandRunner>,
    account: String,
    receive_wait_secs: u64,
}

impl SignalClient {
    pub fn new(runner: Arc<dyn CommandRunner>, account: impl Into<String>) -> Self {
        Self {
            runner,
            account: account.into(),
            receive_wait_secs: 5,
        }
    }

    /// How long `receive` waits for new messages.
    #[must_use]
    pub fn with_receive_wait(mut self, secs: u64) -> Self {
        self.receive_wait_secs = secs;
        self
    }

    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Pull pending messages from the Signal servers.
    ///
    /// signal-cli hands each message out once, so callers should persist
    /// what comes back.
    pub async fn receive(&self) -> Result<Vec<NormalizedMessage>> {
        let records = self
            .runner
            .run(&[
                "receive".into(),
                "--timeout".into(),
                self.receive_wait_secs.to_string(),
            ])
            .await?;
        let messages = messages_from_records(&records, &self.account);
        debug!(
            records = records.len(),
            messages = messages.len(),
            "received from signal-cli"
        );
        Ok(messages)
    }

    pub async fn list_contacts(&self) -> Result<Vec<ChatEntry>> {
        let records = self.runner.run(&["listContacts".into()]).await?;
        Ok(decode::<Contact>(records)
            .iter()
            .filter(|c| !c.is_blocked)
            .filter_map(chat_from_contact)
            .collect())
    }

    /// Groups this account is a member of.
    pub async fn list_groups(&self) -> Result<Vec<ChatEntry>> {
        let records = self.runner.run(&["listGroups".into()]).await?;
        Ok(decode::<Group>(records)
            .iter()
            .filter(|g| g.is_member && !g.is_blocked)
            .filter_map(chat_from_group)
            .collect())
    }

    /// Contacts first, then groups.
    pub async fn list_chats(&self) -> Result<Vec<ChatEntry>> {
        let mut chats = self.list_contacts().await?;
        chats.extend(self.list_groups().await?);
        Ok(chats)
    }

    /// Send a text message. `kind` overrides recipient-kind detection.
    pub async fn send(
        &self,
        recipient: &str,
        message: &str,
        kind: Option<RecipientKind>,
    ) -> Result<SendReceipt> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(Error::InvalidRecipient("recipient is empty".into()));
        }
        let kind = RecipientKind::resolve(recipient, kind);

        let mut args: Vec<String> = vec!["send".into(), "-m".into(), message.into()];
        match kind {
            RecipientKind::Group => {
                args.push("-g".into());
                args.push(recipient.into());
            },
            RecipientKind::Individual => args.push(recipient.into()),
        }

        let records = self.runner.run(&args).await?;
        let timestamp = decode::<SendRecord>(records)
            .into_iter()
            .find_map(|r| r.timestamp)
            .unwrap_or_else(now_ms);
        info!(kind = %kind, timestamp, "message sent");
        Ok(SendReceipt { timestamp, kind })
    }
}

/// Decode records of one shape, skipping those that do not fit.
fn decode<T: serde::de::DeserializeOwned>(records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "skipping unexpected signal-cli record");
                None
            },
        })
        .collect()
}
