//! Account repository for userbase.

use chrono::{DateTime, Utc};

use super::types::Account;
use crate::auth::token::ACTIVATED;
use crate::db::DbConnection;
use crate::{Result, UserbaseError};

const ACCOUNT_COLUMNS: &str = "user_id, activation_key, activation_key_created,
    activation_notification_sent, email_unconfirmed, email_confirmation_key,
    email_confirmation_key_created, last_active";

/// Repository for account rows.
pub struct AccountRepository<'c> {
    conn: &'c mut DbConnection,
}

impl<'c> AccountRepository<'c> {
    /// Create a new repository on the given connection.
    pub fn new(conn: &'c mut DbConnection) -> Self {
        Self { conn }
    }

    /// Create the account for `user_id`.
    pub async fn create(
        &mut self,
        user_id: i64,
        activation_key: &str,
        created: DateTime<Utc>,
    ) -> Result<Account> {
        sqlx::query(
            "INSERT INTO accounts (user_id, activation_key, activation_key_created)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(activation_key)
        .bind(created)
        .execute(&mut *self.conn)
        .await?;

        self.get_by_user_id(user_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("account".to_string()))
    }

    /// Get the account of a user.
    pub async fn get_by_user_id(&mut self, user_id: i64) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(account)
    }

    /// Accounts that have not been activated yet, oldest key first.
    pub async fn list_pending(&mut self) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE activation_key <> $1
             ORDER BY activation_key_created, user_id"
        );
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .bind(ACTIVATED)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(accounts)
    }

    /// Replace the activation key and reset the reminder flag.
    pub async fn set_activation_key(
        &mut self,
        user_id: i64,
        key: &str,
        created: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts
             SET activation_key = $1, activation_key_created = $2,
                 activation_notification_sent = $3
             WHERE user_id = $4",
        )
        .bind(key)
        .bind(created)
        .bind(false)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Consume the activation key of `user_id` if it still equals `key`.
    ///
    /// Returns false when the key was already consumed or replaced.
    pub async fn consume_activation_key(&mut self, user_id: i64, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET activation_key = $1
             WHERE user_id = $2 AND activation_key = $3",
        )
        .bind(ACTIVATED)
        .bind(user_id)
        .bind(key)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that the expiry reminder was sent.
    pub async fn set_notification_sent(&mut self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET activation_notification_sent = $1 WHERE user_id = $2",
        )
        .bind(true)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a pending email change.
    pub async fn set_email_change(
        &mut self,
        user_id: i64,
        email: &str,
        key: &str,
        created: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts
             SET email_unconfirmed = $1, email_confirmation_key = $2,
                 email_confirmation_key_created = $3
             WHERE user_id = $4",
        )
        .bind(email)
        .bind(key)
        .bind(created)
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the pending email change.
    pub async fn clear_email_change(&mut self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts
             SET email_unconfirmed = '', email_confirmation_key = '',
                 email_confirmation_key_created = NULL
             WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp the last time the user was seen.
    pub async fn touch_last_active(&mut self, user_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET last_active = $1 WHERE user_id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::Database;
    use chrono::Duration;

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let user = UserRepository::new(&mut conn)
            .create(&NewUser::new("alice", "alice@example.com", "hash", Utc::now()).with_active(false))
            .await
            .unwrap();
        drop(conn);
        (db, user.id)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountRepository::new(&mut conn);

        let key = "a".repeat(40);
        let now = Utc::now();
        let account = repo.create(user_id, &key, now).await.unwrap();
        assert_eq!(account.user_id, user_id);
        assert_eq!(account.activation_key, key);
        assert_eq!(account.activation_key_created, now);
        assert!(!account.activation_notification_sent);
        assert!(account.email_unconfirmed.is_empty());

        let found = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(found, account);
        assert!(repo.get_by_user_id(user_id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_activation_key_once() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountRepository::new(&mut conn);

        let key = "a".repeat(40);
        repo.create(user_id, &key, Utc::now()).await.unwrap();

        assert!(repo.consume_activation_key(user_id, &key).await.unwrap());
        assert!(!repo.consume_activation_key(user_id, &key).await.unwrap());

        let account = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert!(account.is_activated());
        assert_eq!(account.activation_key, ACTIVATED);
        assert!(repo.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_activation_key_resets_notification() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountRepository::new(&mut conn);

        let created = Utc::now() - Duration::days(10);
        repo.create(user_id, &"a".repeat(40), created).await.unwrap();
        repo.set_notification_sent(user_id).await.unwrap();
        assert!(
            repo.get_by_user_id(user_id)
                .await
                .unwrap()
                .unwrap()
                .activation_notification_sent
        );

        let now = Utc::now();
        repo.set_activation_key(user_id, &"b".repeat(40), now)
            .await
            .unwrap();
        let account = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert_eq!(account.activation_key, "b".repeat(40));
        assert_eq!(account.activation_key_created, now);
        assert!(!account.activation_notification_sent);
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_email_change_round_trip() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountRepository::new(&mut conn);

        repo.create(user_id, ACTIVATED, Utc::now()).await.unwrap();
        let now = Utc::now();
        repo.set_email_change(user_id, "new@example.com", &"c".repeat(40), now)
            .await
            .unwrap();

        let account = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert!(account.has_pending_email());
        assert_eq!(account.email_unconfirmed, "new@example.com");
        assert_eq!(account.email_confirmation_key_created, Some(now));

        repo.clear_email_change(user_id).await.unwrap();
        let account = repo.get_by_user_id(user_id).await.unwrap().unwrap();
        assert!(!account.has_pending_email());
        assert!(account.email_confirmation_key_created.is_none());
    }

    #[tokio::test]
    async fn test_account_removed_with_user() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();

        AccountRepository::new(&mut conn)
            .create(user_id, &"a".repeat(40), Utc::now())
            .await
            .unwrap();
        UserRepository::new(&mut conn).delete(user_id).await.unwrap();

        assert!(AccountRepository::new(&mut conn)
            .get_by_user_id(user_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_touch_last_active() {
        let (db, user_id) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AccountRepository::new(&mut conn);

        repo.create(user_id, ACTIVATED, Utc::now()).await.unwrap();
        let at = Utc::now();
        assert!(repo.touch_last_active(user_id, at).await.unwrap());
        assert_eq!(
            repo.get_by_user_id(user_id).await.unwrap().unwrap().last_active,
            Some(at)
        );
        assert!(!repo.touch_last_active(999, at).await.unwrap());
    }
}
