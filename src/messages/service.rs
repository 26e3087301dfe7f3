//! Message service for userbase.
//!
//! Recipient validation, drafts, mailbox views, read tracking and per-party
//! trash. Deletion only stamps the caller's side of a message; rows go away
//! in [`MessageService::purge_deleted`] once every party has trashed them.

use std::collections::HashMap;

use tracing::{debug, info};

use super::repository::MessageRepository;
use super::types::{Contact, Message, MessageDetail, NewMessage, MAX_BODY_LENGTH};
use crate::app::Application;
use crate::auth::validation::ValidationError;
use crate::auth::AuthError;
use crate::db::{DbConnection, User, UserRepository};
use crate::{Result, UserbaseError};

/// Service for private message operations.
pub struct MessageService<'a> {
    app: &'a Application,
}

impl<'a> MessageService<'a> {
    /// Create a new MessageService on the given application.
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Send a message to one or more users.
    ///
    /// When `parent` is given the sender's recipient row on it is marked
    /// replied.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The sender is inactive
    /// - The body is blank or too long
    /// - There are no recipients, or one is unknown, inactive or the sender
    /// - The parent message does not exist
    pub async fn send_message(
        &self,
        sender: &User,
        recipients: &[&str],
        body: &str,
        parent: Option<i64>,
    ) -> Result<Message> {
        ensure_active(sender)?;
        let body = validate_body(body)?;
        let now = self.app.now();

        let mut tx = self.app.db().begin().await?;
        let recipients = resolve_recipients(&mut tx, sender, recipients).await?;
        if recipients.is_empty() {
            return Err(ValidationError::NoRecipients.into());
        }

        let mut repo = MessageRepository::new(&mut tx);
        if let Some(parent_id) = parent {
            if repo.get_by_id(parent_id).await?.is_none() {
                return Err(UserbaseError::NotFound("message".to_string()));
            }
        }

        let message = repo
            .create(&NewMessage::sent(sender.id, body, now).with_parent(parent))
            .await?;
        for recipient in &recipients {
            repo.add_recipient(message.id, recipient.id).await?;
            repo.upsert_contact(sender.id, recipient.id, message.id).await?;
        }
        if let Some(parent_id) = parent {
            repo.set_replied(parent_id, sender.id, now).await?;
        }
        tx.commit().await?;

        info!(
            message_id = message.id,
            sender = %sender.username,
            recipients = recipients.len(),
            "Message sent"
        );
        Ok(message)
    }

    /// Store a draft. Recipients may be empty until the draft is sent.
    pub async fn save_draft(
        &self,
        sender: &User,
        recipients: &[&str],
        body: &str,
        parent: Option<i64>,
    ) -> Result<Message> {
        ensure_active(sender)?;
        let body = validate_body(body)?;
        let now = self.app.now();

        let mut tx = self.app.db().begin().await?;
        let recipients = resolve_recipients(&mut tx, sender, recipients).await?;
        let mut repo = MessageRepository::new(&mut tx);
        let draft = repo
            .create(&NewMessage::draft(sender.id, body, now).with_parent(parent))
            .await?;
        for recipient in &recipients {
            repo.add_recipient(draft.id, recipient.id).await?;
        }
        tx.commit().await?;

        debug!(message_id = draft.id, sender = %sender.username, "Draft saved");
        Ok(draft)
    }

    /// Replace the recipients and body of an unsent draft.
    pub async fn update_draft(
        &self,
        sender: &User,
        draft_id: i64,
        recipients: &[&str],
        body: &str,
    ) -> Result<Message> {
        let body = validate_body(body)?;

        let mut tx = self.app.db().begin().await?;
        load_own_draft(&mut tx, sender, draft_id).await?;
        let recipients = resolve_recipients(&mut tx, sender, recipients).await?;

        let mut repo = MessageRepository::new(&mut tx);
        repo.update_draft_body(draft_id, body).await?;
        repo.clear_recipients(draft_id).await?;
        for recipient in &recipients {
            repo.add_recipient(draft_id, recipient.id).await?;
        }
        let draft = repo
            .get_by_id(draft_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("message".to_string()))?;
        tx.commit().await?;
        Ok(draft)
    }

    /// Send a draft to its stored recipients.
    pub async fn send_draft(&self, sender: &User, draft_id: i64) -> Result<Message> {
        ensure_active(sender)?;
        let now = self.app.now();

        let mut tx = self.app.db().begin().await?;
        let draft = load_own_draft(&mut tx, sender, draft_id).await?;

        let rows = MessageRepository::new(&mut tx).recipients(draft_id).await?;
        if rows.is_empty() {
            return Err(ValidationError::NoRecipients.into());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
        let users = UserRepository::new(&mut tx).get_many(&ids).await?;
        if let Some(inactive) = users.iter().find(|u| !u.is_active) {
            return Err(ValidationError::RecipientInactive(inactive.username.clone()).into());
        }

        let mut repo = MessageRepository::new(&mut tx);
        repo.mark_sent(draft_id, now).await?;
        for user in &users {
            repo.upsert_contact(sender.id, user.id, draft_id).await?;
        }
        if let Some(parent_id) = draft.parent_id {
            repo.set_replied(parent_id, sender.id, now).await?;
        }
        let message = repo
            .get_by_id(draft_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("message".to_string()))?;
        tx.commit().await?;

        info!(message_id = message.id, sender = %sender.username, "Draft sent");
        Ok(message)
    }

    /// Messages the user received and has not trashed, newest first.
    pub async fn inbox_for(&self, user_id: i64) -> Result<Vec<Message>> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn).inbox(user_id).await
    }

    /// Messages the user sent and has not trashed, newest first.
    pub async fn outbox_for(&self, user_id: i64) -> Result<Vec<Message>> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn).outbox(user_id).await
    }

    /// The user's unsent drafts.
    pub async fn drafts_for(&self, user_id: i64) -> Result<Vec<Message>> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn).drafts(user_id).await
    }

    /// Messages the user trashed as sender or recipient.
    pub async fn trash_for(&self, user_id: i64) -> Result<Vec<Message>> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn).trash(user_id).await
    }

    /// Every message exchanged between two users, newest first.
    ///
    /// Ignores trash state on both sides.
    pub async fn conversation_between(&self, a: i64, b: i64) -> Result<Vec<Message>> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn).conversation(a, b).await
    }

    /// The conversation with `other_id` as `viewer_id` sees it.
    ///
    /// Leaves out what the viewer trashed and marks the viewer's unread
    /// messages in it read.
    pub async fn view_conversation(&self, viewer_id: i64, other_id: i64) -> Result<Vec<Message>> {
        let now = self.app.now();
        let mut conn = self.app.db().acquire().await?;
        let mut repo = MessageRepository::new(&mut conn);
        let messages = repo.visible_conversation(viewer_id, other_id).await?;

        let received: Vec<i64> = messages
            .iter()
            .filter(|m| m.sender_id == other_id)
            .map(|m| m.id)
            .collect();
        let marked = repo.mark_read(&received, viewer_id, now).await?;
        if marked > 0 {
            debug!(viewer_id, other_id, marked, "Conversation marked read");
        }
        Ok(messages)
    }

    /// Mark the user's unread rows of `message_ids` read.
    ///
    /// Already-read rows are untouched. Returns the rows changed.
    pub async fn mark_read(&self, message_ids: &[i64], user_id: i64) -> Result<u64> {
        let now = self.app.now();
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn)
            .mark_read(message_ids, user_id, now)
            .await
    }

    /// Move messages to the user's trash, or back out with `undo`.
    ///
    /// Each message is toggled on every side the user is on: as sender and
    /// as recipient. Unknown IDs and messages the user is not part of are
    /// skipped. Returns the IDs that changed.
    pub async fn remove(&self, message_ids: &[i64], user_id: i64, undo: bool) -> Result<Vec<i64>> {
        let stamp = if undo { None } else { Some(self.app.now()) };

        let mut tx = self.app.db().begin().await?;
        let mut repo = MessageRepository::new(&mut tx);
        let mut changed = Vec::new();
        for &id in message_ids {
            let Some(message) = repo.get_by_id(id).await? else {
                continue;
            };
            let mut touched = false;
            if message.sender_id == user_id {
                touched |= repo.set_sender_deleted(id, stamp).await?;
            }
            if !message.is_draft() {
                touched |= repo.set_recipient_deleted(id, user_id, stamp).await?;
            }
            if touched && !changed.contains(&id) {
                changed.push(id);
            }
        }
        tx.commit().await?;

        info!(user_id, undo, count = changed.len(), "Messages moved");
        Ok(changed)
    }

    /// Unread messages in the user's inbox.
    pub async fn count_unread_for(&self, user_id: i64) -> Result<i64> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn)
            .count_unread(user_id, None)
            .await
    }

    /// Unread messages in the user's inbox that came from `other_id`.
    pub async fn count_unread_between(&self, user_id: i64, other_id: i64) -> Result<i64> {
        let mut conn = self.app.db().acquire().await?;
        MessageRepository::new(&mut conn)
            .count_unread(user_id, Some(other_id))
            .await
    }

    /// The user's contact list, most recent exchange first.
    pub async fn contacts_for(&self, user_id: i64) -> Result<Vec<Contact>> {
        let mut conn = self.app.db().acquire().await?;
        let contacts = MessageRepository::new(&mut conn).contacts(user_id).await?;

        let ids: Vec<i64> = contacts.iter().map(|c| c.opposite(user_id)).collect();
        let users: HashMap<i64, User> = UserRepository::new(&mut conn)
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut repo = MessageRepository::new(&mut conn);
        let mut entries = Vec::with_capacity(contacts.len());
        for contact in contacts {
            let other_id = contact.opposite(user_id);
            let (Some(user), Some(latest_message)) = (
                users.get(&other_id),
                repo.get_by_id(contact.latest_message_id).await?,
            ) else {
                continue;
            };
            let unread = repo.count_unread(user_id, Some(other_id)).await?;
            entries.push(Contact {
                user: user.clone(),
                latest_message,
                unread,
            });
        }
        Ok(entries)
    }

    /// Load a message for `viewer_id` and mark it read if they received it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the message does not exist and `Permission`
    /// if the viewer is neither its sender nor a recipient. Recipients of a
    /// draft do not see it yet.
    pub async fn get_message(&self, viewer_id: i64, message_id: i64) -> Result<MessageDetail> {
        let now = self.app.now();
        let mut conn = self.app.db().acquire().await?;
        let mut repo = MessageRepository::new(&mut conn);

        let message = repo
            .get_by_id(message_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("message".to_string()))?;
        let recipients = repo.recipients(message_id).await?;

        let is_sender = message.sender_id == viewer_id;
        let is_recipient = !message.is_draft() && recipients.iter().any(|r| r.user_id == viewer_id);
        if !is_sender && !is_recipient {
            return Err(UserbaseError::Permission(
                "not a party to this message".to_string(),
            ));
        }

        let unread = recipients
            .iter()
            .any(|r| r.user_id == viewer_id && !r.is_read());
        let recipients = if is_recipient && unread {
            repo.mark_read(&[message_id], viewer_id, now).await?;
            repo.recipients(message_id).await?
        } else {
            recipients
        };

        Ok(MessageDetail {
            message,
            recipients,
        })
    }

    /// Physically delete messages every party has trashed.
    pub async fn purge_deleted(&self) -> Result<u64> {
        let mut conn = self.app.db().acquire().await?;
        let purged = MessageRepository::new(&mut conn).purge_deleted().await?;
        info!(purged, "Purged deleted messages");
        Ok(purged)
    }
}

fn ensure_active(user: &User) -> Result<()> {
    if user.is_active {
        Ok(())
    } else {
        Err(AuthError::Inactive.into())
    }
}

fn validate_body(body: &str) -> Result<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationError::MessageBodyEmpty.into());
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        return Err(ValidationError::MessageBodyTooLong(MAX_BODY_LENGTH).into());
    }
    Ok(body)
}

/// Look up recipients by username, dropping duplicates.
async fn resolve_recipients(
    conn: &mut DbConnection,
    sender: &User,
    usernames: &[&str],
) -> Result<Vec<User>> {
    let mut repo = UserRepository::new(conn);
    let mut users: Vec<User> = Vec::with_capacity(usernames.len());
    for name in usernames.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let user = repo
            .get_by_username(name)
            .await?
            .ok_or_else(|| ValidationError::RecipientUnknown(name.to_string()))?;
        if user.id == sender.id {
            return Err(ValidationError::RecipientIsSender.into());
        }
        if !user.is_active {
            return Err(ValidationError::RecipientInactive(user.username).into());
        }
        if !users.iter().any(|u| u.id == user.id) {
            users.push(user);
        }
    }
    Ok(users)
}

async fn load_own_draft(conn: &mut DbConnection, sender: &User, draft_id: i64) -> Result<Message> {
    let draft = MessageRepository::new(conn)
        .get_by_id(draft_id)
        .await?
        .filter(|m| m.sender_id == sender.id && !m.is_deleted_by_sender())
        .ok_or_else(|| UserbaseError::NotFound("draft".to_string()))?;
    if !draft.is_draft() {
        return Err(UserbaseError::Permission(
            "message has already been sent".to_string(),
        ));
    }
    Ok(draft)
}
