//! Pure conversions from signal-cli records to normalized results.

use {serde_json::Value, tracing::debug};

use crate::{
    raw::{Contact, Envelope, GroupInfo, Group, RawAttachment, ReceiveRecord},
    types::{Attachment, ChatEntry, NormalizedMessage},
};

/// Normalize every message-bearing record in a `receive` batch.
///
/// Records that are not envelopes, or envelopes carrying only receipts,
/// typing indicators or reactions, are skipped.
pub fn messages_from_records(records: &[Value], account: &str) -> Vec<NormalizedMessage> {
    records
        .iter()
        .filter_map(|record| match serde_json::from_value::<ReceiveRecord>(record.clone()) {
            Ok(rec) => message_from_envelope(&rec.envelope, account),
            Err(e) => {
                debug!(error = %e, "skipping non-envelope record");
                None
            },
        })
        .collect()
}

/// Normalize one envelope.
///
/// Data messages become incoming records. Sync "sent" messages (sent from
/// another linked device) become outgoing records with `sender = account`.
pub fn message_from_envelope(env: &Envelope, account: &str) -> Option<NormalizedMessage> {
    if let Some(data) = env.data_message.as_ref() {
        let sender = non_empty(env.source_number.as_deref())
            .or_else(|| non_empty(env.source.as_deref()))
            .or_else(|| non_empty(env.source_uuid.as_deref()))?;
        let body = non_empty(data.message.as_deref());
        let attachments = convert_attachments(&data.attachments);
        if body.is_none() && attachments.is_empty() {
            return None;
        }
        let (group_id, group_name) = group_fields(data.group_info.as_ref());
        return Some(NormalizedMessage {
            sender: sender.to_string(),
            sender_name: non_empty(env.source_name.as_deref()).map(str::to_string),
            timestamp: data.timestamp.or(env.timestamp)?,
            body: body.map(str::to_string),
            attachments,
            is_group: group_id.is_some(),
            group_id,
            group_name,
            recipient: None,
        });
    }

    let sent = env.sync_message.as_ref()?.sent_message.as_ref()?;
    let body = non_empty(sent.message.as_deref());
    let attachments = convert_attachments(&sent.attachments);
    if body.is_none() && attachments.is_empty() {
        return None;
    }
    let (group_id, group_name) = group_fields(sent.group_info.as_ref());
    let recipient = match group_id.as_deref() {
        Some(id) => id.to_string(),
        None => non_empty(sent.destination_number.as_deref())
            .or_else(|| non_empty(sent.destination.as_deref()))
            .or_else(|| non_empty(sent.destination_uuid.as_deref()))?
            .to_string(),
    };
    Some(NormalizedMessage {
        sender: account.to_string(),
        sender_name: None,
        timestamp: sent.timestamp.or(env.timestamp)?,
        body: body.map(str::to_string),
        attachments,
        is_group: group_id.is_some(),
        group_id,
        group_name,
        recipient: Some(recipient),
    })
}

/// Convert a `listContacts` entry. Contacts without any address are dropped.
pub fn chat_from_contact(contact: &Contact) -> Option<ChatEntry> {
    let address = non_empty(contact.number.as_deref()).or_else(|| non_empty(contact.uuid.as_deref()))?;
    Some(ChatEntry {
        contact: address.to_string(),
        contact_name: contact_display_name(contact),
        is_group: false,
        group_name: None,
    })
}

/// Convert a `listGroups` entry. Groups without an id are dropped.
pub fn chat_from_group(group: &Group) -> Option<ChatEntry> {
    let id = non_empty(group.id.as_deref())?;
    Some(ChatEntry {
        contact: id.to_string(),
        contact_name: None,
        is_group: true,
        group_name: non_empty(group.name.as_deref()).map(str::to_string),
    })
}

fn contact_display_name(contact: &Contact) -> Option<String> {
    if let Some(name) = non_empty(contact.name.as_deref()) {
        return Some(name.to_string());
    }
    let joined = join_names(contact.given_name.as_deref(), contact.family_name.as_deref());
    if joined.is_some() {
        return joined;
    }
    let profile = contact.profile.as_ref()?;
    join_names(profile.given_name.as_deref(), profile.family_name.as_deref())
}

fn join_names(given: Option<&str>, family: Option<&str>) -> Option<String> {
    match (non_empty(given), non_empty(family)) {
        (Some(g), Some(f)) => Some(format!("{g} {f}")),
        (Some(g), None) => Some(g.to_string()),
        (None, Some(f)) => Some(f.to_string()),
        (None, None) => None,
    }
}

fn group_fields(info: Option<&GroupInfo>) -> (Option<String>, Option<String>) {
    let Some(info) = info else {
        return (None, None);
    };
    (
        non_empty(info.group_id.as_deref()).map(str::to_string),
        non_empty(info.group_name.as_deref()).map(str::to_string),
    )
}

fn convert_attachments(raw: &[RawAttachment]) -> Vec<Attachment> {
    raw.iter()
        .filter_map(|a| {
            Some(Attachment {
                id: non_empty(a.id.as_deref())?.to_string(),
                content_type: a.content_type.clone(),
                filename: a.filename.clone(),
                size: a.size,
            })
        })
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    const ACCOUNT: &str = "+15550000000";

    fn records(values: Vec<Value>) -> Vec<NormalizedMessage> {
        messages_from_records(&values, ACCOUNT)
    }

    #[test]
    fn incoming_direct_message() {
        let msgs = records(vec![json!({
            "envelope": {
                "source": "+15551234567",
                "sourceNumber": "+15551234567",
                "sourceName": "Alice",
                "timestamp": 1700000000000_i64,
                "dataMessage": {
                    "timestamp": 1700000000000_i64,
                    "message": "hello there"
                }
            },
            "account": ACCOUNT
        })]);
        assert_eq!(msgs.len(), 1);
        let m = &msgs[0];
        assert_eq!(m.sender, "+15551234567");
        assert_eq!(m.sender_name.as_deref(), Some("Alice"));
        assert_eq!(m.body.as_deref(), Some("hello there"));
        assert!(!m.is_group);
        assert!(m.recipient.is_none());
    }

    #[test]
    fn incoming_group_message_with_attachment() {
        let msgs = records(vec![json!({
            "envelope": {
                "sourceNumber": "+15551234567",
                "timestamp": 5,
                "dataMessage": {
                    "timestamp": 6,
                    "attachments": [
                        {"id": "abc.jpg", "contentType": "image/jpeg", "size": 42},
                        {"contentType": "image/png"}
                    ],
                    "groupInfo": {"groupId": "R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==", "type": "DELIVER"}
                }
            }
        })]);
        let m = &msgs[0];
        assert!(m.is_group);
        assert_eq!(m.timestamp, 6);
        assert!(m.body.is_none());
        assert_eq!(m.attachments.len(), 1);
        assert_eq!(m.attachments[0].id, "abc.jpg");
        assert_eq!(
            m.group_id.as_deref(),
            Some("R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==")
        );
    }

    #[test]
    fn sync_sent_message_is_outgoing() {
        let msgs = records(vec![json!({
            "envelope": {
                "sourceNumber": ACCOUNT,
                "timestamp": 10,
                "syncMessage": {
                    "sentMessage": {
                        "destinationNumber": "+15559999999",
                        "timestamp": 11,
                        "message": "on my way"
                    }
                }
            }
        })]);
        let m = &msgs[0];
        assert_eq!(m.sender, ACCOUNT);
        assert_eq!(m.recipient.as_deref(), Some("+15559999999"));
        assert!(m.is_outgoing());
    }

    #[test]
    fn receipts_and_garbage_are_skipped() {
        let msgs = records(vec![
            json!({"envelope": {"sourceNumber": "+1", "timestamp": 1, "receiptMessage": {"isDelivery": true}}}),
            json!({"envelope": {"sourceNumber": "+1", "timestamp": 2, "dataMessage": {"timestamp": 2}}}),
            json!({"unexpected": true}),
            json!([1, 2, 3]),
        ]);
        assert!(msgs.is_empty());
    }

    #[test]
    fn contact_name_falls_back_to_profile() {
        let contact: Contact = serde_json::from_value(json!({
            "number": "+15551234567",
            "name": "",
            "profile": {"givenName": "Bob", "familyName": "Stone"}
        }))
        .unwrap();
        let chat = chat_from_contact(&contact).unwrap();
        assert_eq!(chat.contact_name.as_deref(), Some("Bob Stone"));
        assert!(!chat.is_group);
    }

    #[test]
    fn contact_without_address_is_dropped() {
        let contact: Contact = serde_json::from_value(json!({"name": "Ghost"})).unwrap();
        assert!(chat_from_contact(&contact).is_none());
    }

    #[test]
    fn group_entry() {
        let group: Group =
            serde_json::from_value(json!({"id": "Z3JvdXA=", "name": "Climbing"})).unwrap();
        let chat = chat_from_group(&group).unwrap();
        assert!(chat.is_group);
        assert_eq!(chat.group_name.as_deref(), Some("Climbing"));
        assert!(group.is_member);
    }
}
