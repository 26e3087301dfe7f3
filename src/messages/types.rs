//! Message types for userbase.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::User;

/// Maximum length for a message body.
pub const MAX_BODY_LENGTH: usize = 10000;

/// A private message.
///
/// Recipients and their per-user state live in [`MessageRecipient`] rows.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Message {
    /// Message ID.
    pub id: i64,
    /// Sender user ID.
    pub sender_id: i64,
    /// Message this one replies to.
    pub parent_id: Option<i64>,
    /// Message body.
    pub body: String,
    /// When the message (or draft) was written.
    pub created_at: DateTime<Utc>,
    /// When the message was sent. `None` for drafts.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the sender moved it to the trash.
    pub sender_deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether this is an unsent draft.
    pub fn is_draft(&self) -> bool {
        self.sent_at.is_none()
    }

    /// Whether the sender has trashed it.
    pub fn is_deleted_by_sender(&self) -> bool {
        self.sender_deleted_at.is_some()
    }
}

/// One recipient of a message and that recipient's mailbox state.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct MessageRecipient {
    /// Row ID.
    pub id: i64,
    /// Message ID.
    pub message_id: i64,
    /// Recipient user ID.
    pub user_id: i64,
    /// When the recipient first read it.
    pub read_at: Option<DateTime<Utc>>,
    /// When the recipient moved it to the trash.
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the recipient replied to it.
    pub replied_at: Option<DateTime<Utc>>,
}

impl MessageRecipient {
    /// Whether the recipient has read the message.
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Whether the recipient has trashed the message.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Latest message exchanged between two users.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct MessageContact {
    /// Row ID.
    pub id: i64,
    /// User who sent the first message between the two.
    pub from_user_id: i64,
    /// The other user.
    pub to_user_id: i64,
    /// Latest message between them.
    pub latest_message_id: i64,
}

impl MessageContact {
    /// The user on the other side from `user_id`.
    pub fn opposite(&self, user_id: i64) -> i64 {
        if self.from_user_id == user_id {
            self.to_user_id
        } else {
            self.from_user_id
        }
    }
}

/// New message for creation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Sender user ID.
    pub sender_id: i64,
    /// Message replied to.
    pub parent_id: Option<i64>,
    /// Message body.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Send time, `None` to store a draft.
    pub sent_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// A message sent at `now`.
    pub fn sent(sender_id: i64, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            parent_id: None,
            body: body.into(),
            created_at: now,
            sent_at: Some(now),
        }
    }

    /// A draft written at `now`.
    pub fn draft(sender_id: i64, body: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            parent_id: None,
            body: body.into(),
            created_at: now,
            sent_at: None,
        }
    }

    /// Mark as a reply.
    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// A message together with all its recipient rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageDetail {
    /// The message.
    pub message: Message,
    /// Recipient rows.
    pub recipients: Vec<MessageRecipient>,
}

impl MessageDetail {
    /// The row of `user_id`, if they are a recipient.
    pub fn recipient(&self, user_id: i64) -> Option<&MessageRecipient> {
        self.recipients.iter().find(|r| r.user_id == user_id)
    }
}

/// An entry of a user's contact list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    /// The other user.
    pub user: User,
    /// Latest message exchanged.
    pub latest_message: Message,
    /// Messages from `user` the viewer has not read.
    pub unread: i64,
}

/// Parse message IDs from form input, skipping anything malformed.
pub fn parse_message_ids<S: AsRef<str>>(raw: &[S]) -> Vec<i64> {
    raw.iter()
        .filter_map(|s| s.as_ref().trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}
