//! Message repository for userbase.
//!
//! Mailbox views are queries over `messages` and `message_recipients`;
//! nothing is copied per user.

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::types::{Message, MessageContact, MessageRecipient, NewMessage};
use crate::db::{DbBackend, DbConnection};
use crate::{Result, UserbaseError};

const MESSAGE_COLUMNS: &str =
    "m.id, m.sender_id, m.parent_id, m.body, m.created_at, m.sent_at, m.sender_deleted_at";

const RECIPIENT_COLUMNS: &str = "id, message_id, user_id, read_at, deleted_at, replied_at";

/// Repository for message rows.
pub struct MessageRepository<'c> {
    conn: &'c mut DbConnection,
}

impl<'c> MessageRepository<'c> {
    /// Create a new repository on the given connection.
    pub fn new(conn: &'c mut DbConnection) -> Self {
        Self { conn }
    }

    /// Create a message or draft.
    pub async fn create(&mut self, message: &NewMessage) -> Result<Message> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (sender_id, parent_id, body, created_at, sent_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(message.sender_id)
        .bind(message.parent_id)
        .bind(&message.body)
        .bind(message.created_at)
        .bind(message.sent_at)
        .fetch_one(&mut *self.conn)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("message".to_string()))
    }

    /// Get a message by ID.
    pub async fn get_by_id(&mut self, id: i64) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = $1");
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(message)
    }

    /// Replace the body of a draft. Sent messages are left alone.
    pub async fn update_draft_body(&mut self, id: i64, body: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET body = $1 WHERE id = $2 AND sent_at IS NULL")
            .bind(body)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp a draft as sent.
    pub async fn mark_sent(&mut self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE messages SET sent_at = $1 WHERE id = $2 AND sent_at IS NULL")
                .bind(at)
                .bind(id)
                .execute(&mut *self.conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Add a recipient row.
    pub async fn add_recipient(&mut self, message_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO message_recipients (message_id, user_id) VALUES ($1, $2)")
            .bind(message_id)
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Drop every recipient row of a message.
    pub async fn clear_recipients(&mut self, message_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM message_recipients WHERE message_id = $1")
            .bind(message_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Recipient rows of a message.
    pub async fn recipients(&mut self, message_id: i64) -> Result<Vec<MessageRecipient>> {
        let sql = format!(
            "SELECT {RECIPIENT_COLUMNS} FROM message_recipients WHERE message_id = $1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MessageRecipient>(&sql)
            .bind(message_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    /// The recipient row of `user_id` on a message.
    pub async fn recipient(
        &mut self,
        message_id: i64,
        user_id: i64,
    ) -> Result<Option<MessageRecipient>> {
        let sql = format!(
            "SELECT {RECIPIENT_COLUMNS} FROM message_recipients
             WHERE message_id = $1 AND user_id = $2"
        );
        let row = sqlx::query_as::<_, MessageRecipient>(&sql)
            .bind(message_id)
            .bind(user_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row)
    }

    /// Sent messages the user received and has not trashed.
    pub async fn inbox(&mut self, user_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             JOIN message_recipients r ON r.message_id = m.id
             WHERE r.user_id = $1 AND r.deleted_at IS NULL AND m.sent_at IS NOT NULL
             ORDER BY m.sent_at DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[user_id]).await
    }

    /// Sent messages the user wrote and has not trashed.
    pub async fn outbox(&mut self, user_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.sender_id = $1 AND m.sent_at IS NOT NULL AND m.sender_deleted_at IS NULL
             ORDER BY m.sent_at DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[user_id]).await
    }

    /// Unsent drafts of the user.
    pub async fn drafts(&mut self, user_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.sender_id = $1 AND m.sent_at IS NULL AND m.sender_deleted_at IS NULL
             ORDER BY m.created_at DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[user_id]).await
    }

    /// Messages the user trashed, as sender or as recipient.
    pub async fn trash(&mut self, user_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE (m.sender_id = $1 AND m.sender_deleted_at IS NOT NULL)
                OR (m.sent_at IS NOT NULL AND EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = m.id AND r.user_id = $1
                          AND r.deleted_at IS NOT NULL))
             ORDER BY COALESCE(m.sent_at, m.created_at) DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[user_id]).await
    }

    /// Every sent message between two users, newest first.
    pub async fn conversation(&mut self, a: i64, b: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.sent_at IS NOT NULL AND (
                   (m.sender_id = $1 AND EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = m.id AND r.user_id = $2))
                OR (m.sender_id = $2 AND EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = m.id AND r.user_id = $1)))
             ORDER BY m.sent_at DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[a, b]).await
    }

    /// The conversation as `viewer` sees it: without what the viewer trashed.
    pub async fn visible_conversation(&mut self, viewer: i64, other: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             WHERE m.sent_at IS NOT NULL AND (
                   (m.sender_id = $1 AND m.sender_deleted_at IS NULL AND EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = m.id AND r.user_id = $2))
                OR (m.sender_id = $2 AND EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = m.id AND r.user_id = $1
                          AND r.deleted_at IS NULL)))
             ORDER BY m.sent_at DESC, m.id DESC"
        );
        self.fetch_messages(&sql, &[viewer, other]).await
    }

    async fn fetch_messages(&mut self, sql: &str, ids: &[i64]) -> Result<Vec<Message>> {
        let mut query = sqlx::query_as::<_, Message>(sql);
        for id in ids {
            query = query.bind(*id);
        }
        let messages = query.fetch_all(&mut *self.conn).await?;
        Ok(messages)
    }

    /// Mark the user's unread rows of `message_ids` read.
    ///
    /// Rows already read keep their original time. Returns the rows changed.
    pub async fn mark_read(
        &mut self,
        message_ids: &[i64],
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<DbBackend> =
            QueryBuilder::new("UPDATE message_recipients SET read_at = ");
        query.push_bind(at);
        query.push(" WHERE read_at IS NULL AND user_id = ");
        query.push_bind(user_id);
        query.push(" AND message_id IN (");
        let mut separated = query.separated(", ");
        for id in message_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    /// Set or clear the sender's trash stamp.
    pub async fn set_sender_deleted(&mut self, id: i64, at: Option<DateTime<Utc>>) -> Result<bool> {
        let result = sqlx::query("UPDATE messages SET sender_deleted_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set or clear a recipient's trash stamp.
    pub async fn set_recipient_deleted(
        &mut self,
        message_id: i64,
        user_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE message_recipients SET deleted_at = $1 WHERE message_id = $2 AND user_id = $3",
        )
        .bind(at)
        .bind(message_id)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that the recipient `user_id` replied to a message.
    pub async fn set_replied(
        &mut self,
        message_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE message_recipients SET replied_at = $1 WHERE message_id = $2 AND user_id = $3",
        )
        .bind(at)
        .bind(message_id)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count unread messages in the user's inbox, optionally only from `sender_id`.
    pub async fn count_unread(&mut self, user_id: i64, sender_id: Option<i64>) -> Result<i64> {
        let mut query: QueryBuilder<DbBackend> = QueryBuilder::new(
            "SELECT COUNT(*) FROM message_recipients r
             JOIN messages m ON m.id = r.message_id
             WHERE r.read_at IS NULL AND r.deleted_at IS NULL AND m.sent_at IS NOT NULL
               AND r.user_id = ",
        );
        query.push_bind(user_id);
        if let Some(sender_id) = sender_id {
            query.push(" AND m.sender_id = ");
            query.push_bind(sender_id);
        }
        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }

    /// Point the contact row of two users at `message_id`, creating it if needed.
    pub async fn upsert_contact(
        &mut self,
        from: i64,
        to: i64,
        message_id: i64,
    ) -> Result<MessageContact> {
        let existing = self.get_contact(from, to).await?;
        let id: i64 = match &existing {
            Some(contact) => {
                sqlx::query("UPDATE message_contacts SET latest_message_id = $1 WHERE id = $2")
                    .bind(message_id)
                    .bind(contact.id)
                    .execute(&mut *self.conn)
                    .await?;
                contact.id
            }
            None => {
                sqlx::query_scalar(
                    "INSERT INTO message_contacts (from_user_id, to_user_id, latest_message_id)
                     VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(from)
                .bind(to)
                .bind(message_id)
                .fetch_one(&mut *self.conn)
                .await?
            }
        };

        Ok(MessageContact {
            id,
            from_user_id: existing.as_ref().map_or(from, |c| c.from_user_id),
            to_user_id: existing.as_ref().map_or(to, |c| c.to_user_id),
            latest_message_id: message_id,
        })
    }

    /// The contact row of two users, in either direction.
    pub async fn get_contact(&mut self, a: i64, b: i64) -> Result<Option<MessageContact>> {
        let contact = sqlx::query_as::<_, MessageContact>(
            "SELECT id, from_user_id, to_user_id, latest_message_id FROM message_contacts
             WHERE (from_user_id = $1 AND to_user_id = $2)
                OR (from_user_id = $2 AND to_user_id = $1)",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(contact)
    }

    /// Contact rows involving the user, most recent exchange first.
    pub async fn contacts(&mut self, user_id: i64) -> Result<Vec<MessageContact>> {
        let contacts = sqlx::query_as::<_, MessageContact>(
            "SELECT c.id, c.from_user_id, c.to_user_id, c.latest_message_id
             FROM message_contacts c
             JOIN messages m ON m.id = c.latest_message_id
             WHERE c.from_user_id = $1 OR c.to_user_id = $1
             ORDER BY m.sent_at DESC, m.id DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(contacts)
    }

    /// Physically delete messages every party has trashed.
    ///
    /// Drafts go once the sender trashed them. The latest message of a
    /// contact is kept so the contact list stays intact.
    pub async fn purge_deleted(&mut self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM messages
             WHERE sender_deleted_at IS NOT NULL
               AND id NOT IN (SELECT latest_message_id FROM message_contacts)
               AND (sent_at IS NULL OR NOT EXISTS (
                        SELECT 1 FROM message_recipients r
                        WHERE r.message_id = messages.id AND r.deleted_at IS NULL))",
        )
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count all messages, drafts included.
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::db::{NewUser, UserRepository};
    use crate::Database;

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = UserRepository::new(&mut conn);
        let now = Utc::now();
        let john = repo
            .create(&NewUser::new("john", "john@example.com", "hash", now))
            .await
            .unwrap();
        let jane = repo
            .create(&NewUser::new("jane", "jane@example.com", "hash", now))
            .await
            .unwrap();
        drop(conn);
        (db, john.id, jane.id)
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    async fn send(
        repo: &mut MessageRepository<'_>,
        from: i64,
        to: i64,
        body: &str,
        when: DateTime<Utc>,
    ) -> Message {
        let message = repo.create(&NewMessage::sent(from, body, when)).await.unwrap();
        repo.add_recipient(message.id, to).await.unwrap();
        repo.upsert_contact(from, to, message.id).await.unwrap();
        message
    }

    #[tokio::test]
    async fn test_mailbox_views() {
        let (db, john, jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);

        let first = send(&mut repo, john, jane, "Hello", at(0)).await;
        send(&mut repo, jane, john, "Hi", at(1)).await;
        let third = send(&mut repo, john, jane, "How are you?", at(2)).await;
        let draft = repo
            .create(&NewMessage::draft(john, "Unsent", at(3)))
            .await
            .unwrap();
        repo.add_recipient(draft.id, jane).await.unwrap();

        let inbox = repo.inbox(jane).await.unwrap();
        assert_eq!(
            inbox.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![third.id, first.id]
        );
        assert_eq!(repo.outbox(john).await.unwrap().len(), 2);
        assert_eq!(repo.drafts(john).await.unwrap(), vec![draft.clone()]);
        assert_eq!(repo.conversation(john, jane).await.unwrap().len(), 3);
        assert_eq!(repo.conversation(jane, john).await.unwrap()[0].id, third.id);
        assert!(repo.trash(jane).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trash_and_restore() {
        let (db, john, jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);
        let message = send(&mut repo, john, jane, "Hello", at(0)).await;

        assert!(repo
            .set_recipient_deleted(message.id, jane, Some(at(5)))
            .await
            .unwrap());
        assert!(repo.inbox(jane).await.unwrap().is_empty());
        assert_eq!(repo.trash(jane).await.unwrap().len(), 1);
        assert_eq!(repo.outbox(john).await.unwrap().len(), 1);

        repo.set_recipient_deleted(message.id, jane, None).await.unwrap();
        assert_eq!(repo.inbox(jane).await.unwrap().len(), 1);
        assert!(repo.trash(jane).await.unwrap().is_empty());

        repo.set_sender_deleted(message.id, Some(at(6))).await.unwrap();
        assert!(repo.outbox(john).await.unwrap().is_empty());
        assert_eq!(repo.trash(john).await.unwrap().len(), 1);
        assert!(repo.visible_conversation(john, jane).await.unwrap().is_empty());
        assert_eq!(repo.visible_conversation(jane, john).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_is_guarded() {
        let (db, john, jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);
        let a = send(&mut repo, john, jane, "One", at(0)).await;
        let b = send(&mut repo, john, jane, "Two", at(1)).await;

        assert_eq!(repo.count_unread(jane, None).await.unwrap(), 2);
        assert_eq!(repo.mark_read(&[a.id], jane, at(10)).await.unwrap(), 1);
        assert_eq!(repo.mark_read(&[a.id, b.id], jane, at(20)).await.unwrap(), 1);
        assert_eq!(repo.mark_read(&[a.id], jane, at(30)).await.unwrap(), 0);
        assert_eq!(repo.mark_read(&[], jane, at(30)).await.unwrap(), 0);

        let row = repo.recipient(a.id, jane).await.unwrap().unwrap();
        assert_eq!(row.read_at, Some(at(10)));
        assert_eq!(repo.count_unread(jane, Some(john)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_contact_upsert_either_direction() {
        let (db, john, jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);

        let first = send(&mut repo, john, jane, "Hello", at(0)).await;
        let reply = send(&mut repo, jane, john, "Hi", at(1)).await;

        let contacts = repo.contacts(john).await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].from_user_id, john);
        assert_eq!(contacts[0].latest_message_id, reply.id);
        assert_ne!(contacts[0].latest_message_id, first.id);
        assert_eq!(repo.contacts(jane).await.unwrap(), contacts);
    }

    #[tokio::test]
    async fn test_purge_deleted() {
        let (db, john, jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);

        let old = send(&mut repo, john, jane, "Old", at(0)).await;
        let latest = send(&mut repo, john, jane, "Latest", at(1)).await;
        for id in [old.id, latest.id] {
            repo.set_sender_deleted(id, Some(at(2))).await.unwrap();
        }
        // Only the sender trashed them so far.
        assert_eq!(repo.purge_deleted().await.unwrap(), 0);

        for id in [old.id, latest.id] {
            repo.set_recipient_deleted(id, jane, Some(at(3))).await.unwrap();
        }
        assert_eq!(repo.purge_deleted().await.unwrap(), 1);
        assert!(repo.get_by_id(old.id).await.unwrap().is_none());
        assert!(repo.get_by_id(latest.id).await.unwrap().is_some());

        let draft = repo
            .create(&NewMessage::draft(john, "Scrap", at(0) + Duration::minutes(4)))
            .await
            .unwrap();
        repo.set_sender_deleted(draft.id, Some(at(5))).await.unwrap();
        assert_eq!(repo.purge_deleted().await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_draft_only_mutations() {
        let (db, john, _jane) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = MessageRepository::new(&mut conn);

        let draft = repo
            .create(&NewMessage::draft(john, "v1", at(0)))
            .await
            .unwrap();
        assert!(repo.update_draft_body(draft.id, "v2").await.unwrap());
        assert!(repo.mark_sent(draft.id, at(1)).await.unwrap());
        assert!(!repo.mark_sent(draft.id, at(2)).await.unwrap());
        assert!(!repo.update_draft_body(draft.id, "v3").await.unwrap());

        let sent = repo.get_by_id(draft.id).await.unwrap().unwrap();
        assert_eq!(sent.body, "v2");
        assert_eq!(sent.sent_at, Some(at(1)));
    }
}
