//! Message identifiers and records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier of a message within one mailbox snapshot.
///
/// The value is only meaningful together with the account and mailbox it
/// was listed from, and only until the mailbox is mutated: moving a message
/// assigns it a new identifier in the destination. Two equal values from
/// different mailboxes say nothing about each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A message as listed or read from a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    /// Identifier the message was read under.
    pub id: MessageId,
    /// Subject line.
    pub subject: String,
    /// Sender as shown by the client.
    pub sender: String,
    /// Date received, in the client's local time. Drafts and unsent
    /// messages have none.
    pub date_received: Option<NaiveDateTime>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Whether the message is flagged.
    pub is_flagged: bool,
    /// Recipients and content, present for reads only.
    #[serde(flatten)]
    pub body: Option<MessageBody>,
}

/// Recipients and content of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageBody {
    /// To addresses.
    pub to: Vec<String>,
    /// Cc addresses.
    pub cc: Vec<String>,
    /// Plain-text content.
    pub content: String,
    /// Whether `content` was cut at the requested limit.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl MessageBody {
    /// Truncates content to `max_chars` characters, appending `...`.
    #[must_use]
    pub fn truncate(mut self, max_chars: usize) -> Self {
        if let Some((cut, _)) = self.content.char_indices().nth(max_chars) {
            self.content.truncate(cut);
            self.content.push_str("...");
            self.truncated = true;
        }
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(body: Option<MessageBody>) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(7),
            subject: "Invoice".into(),
            sender: "billing@example.com".into(),
            date_received: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0),
            is_read: false,
            is_flagged: true,
            body,
        }
    }

    #[test]
    fn id_display_and_serde() {
        let id = MessageId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(MessageId::from(42), id);
    }

    #[test]
    fn truncate_long_content() {
        let body = MessageBody {
            content: "héllo world".into(),
            ..MessageBody::default()
        }
        .truncate(5);
        assert_eq!(body.content, "héllo...");
        assert!(body.truncated);
    }

    #[test]
    fn truncate_short_content_is_noop() {
        let body = MessageBody {
            content: "short".into(),
            ..MessageBody::default()
        }
        .truncate(5);
        assert_eq!(body.content, "short");
        assert!(!body.truncated);
    }

    #[test]
    fn summary_serializes_without_body_fields() {
        let json = serde_json::to_value(record(None)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["date_received"], "2024-03-01T09:30:00");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn missing_date_serializes_as_null() {
        let mut message = record(None);
        message.date_received = None;
        let json = serde_json::to_value(message).unwrap();
        assert!(json["date_received"].is_null());
    }

    #[test]
    fn read_serializes_body_inline() {
        let body = MessageBody {
            to: vec!["me@example.com".into()],
            cc: vec![],
            content: "Amount due".into(),
            truncated: false,
        };
        let json = serde_json::to_value(record(Some(body))).unwrap();
        assert_eq!(json["content"], "Amount due");
        assert_eq!(json["to"][0], "me@example.com");
        assert!(json.get("truncated").is_none());
    }
}
