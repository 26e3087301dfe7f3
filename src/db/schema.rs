//! Database schema and migrations for userbase.
//!
//! Migrations are applied in order when the database is opened. Every
//! timestamp column is written from Rust, never from a SQL default, so the
//! services stay in control of time.

/// Database migrations (SQLite dialect).
#[cfg(feature = "sqlite")]
pub const MIGRATIONS: &[&str] = &[
    // v1: users and their accounts
    r#"
CREATE TABLE users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    username        TEXT NOT NULL UNIQUE,
    email           TEXT NOT NULL DEFAULT '',
    password        TEXT NOT NULL,              -- Argon2 hash
    first_name      TEXT NOT NULL DEFAULT '',
    last_name       TEXT NOT NULL DEFAULT '',
    is_active       INTEGER NOT NULL DEFAULT 1,
    is_staff        INTEGER NOT NULL DEFAULT 0,
    is_superuser    INTEGER NOT NULL DEFAULT 0,
    date_joined     TEXT NOT NULL,
    last_login      TEXT
);

CREATE UNIQUE INDEX idx_users_username_lower ON users(LOWER(username));
CREATE INDEX idx_users_email_lower ON users(LOWER(email));

CREATE TABLE accounts (
    user_id                         INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    activation_key                  TEXT NOT NULL,
    activation_key_created          TEXT NOT NULL,
    activation_notification_sent    INTEGER NOT NULL DEFAULT 0,
    email_unconfirmed               TEXT NOT NULL DEFAULT '',
    email_confirmation_key          TEXT NOT NULL DEFAULT '',
    email_confirmation_key_created  TEXT,
    last_active                     TEXT
);

CREATE INDEX idx_accounts_activation_key ON accounts(activation_key);
"#,
    // v2: profiles
    r#"
CREATE TABLE profiles (
    user_id     INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    mugshot     TEXT,
    gender      TEXT,                               -- 'male', 'female'
    birth_date  TEXT,
    website     TEXT NOT NULL DEFAULT '',
    location    TEXT NOT NULL DEFAULT '',
    about       TEXT NOT NULL DEFAULT '',
    privacy     TEXT NOT NULL DEFAULT 'registered', -- 'open', 'registered', 'closed'
    language    TEXT NOT NULL DEFAULT 'en'
);
"#,
    // v3: per-object permissions
    r#"
CREATE TABLE object_permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission  TEXT NOT NULL,
    object_type TEXT NOT NULL,
    object_id   INTEGER NOT NULL,
    UNIQUE(user_id, permission, object_type, object_id)
);

CREATE INDEX idx_object_permissions_object ON object_permissions(object_type, object_id);
"#,
    // v4: private messages
    r#"
CREATE TABLE messages (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    parent_id           INTEGER REFERENCES messages(id) ON DELETE SET NULL,
    body                TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    sent_at             TEXT,                   -- NULL while still a draft
    sender_deleted_at   TEXT
);

CREATE INDEX idx_messages_sender_id ON messages(sender_id);
CREATE INDEX idx_messages_sent_at ON messages(sent_at);

CREATE TABLE message_recipients (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    read_at     TEXT,
    deleted_at  TEXT,
    replied_at  TEXT,
    UNIQUE(message_id, user_id)
);

CREATE INDEX idx_message_recipients_user_id ON message_recipients(user_id);

CREATE TABLE message_contacts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    from_user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    to_user_id          INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    latest_message_id   INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    UNIQUE(from_user_id, to_user_id)
);

CREATE INDEX idx_message_contacts_to_user_id ON message_contacts(to_user_id);
"#,
];

/// Database migrations (PostgreSQL dialect).
#[cfg(feature = "postgres")]
pub const MIGRATIONS: &[&str] = &[
    // v1: users and their accounts
    r#"
CREATE TABLE users (
    id              BIGSERIAL PRIMARY KEY,
    username        TEXT NOT NULL UNIQUE,
    email           TEXT NOT NULL DEFAULT '',
    password        TEXT NOT NULL,
    first_name      TEXT NOT NULL DEFAULT '',
    last_name       TEXT NOT NULL DEFAULT '',
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    is_staff        BOOLEAN NOT NULL DEFAULT FALSE,
    is_superuser    BOOLEAN NOT NULL DEFAULT FALSE,
    date_joined     TIMESTAMPTZ NOT NULL,
    last_login      TIMESTAMPTZ
);

CREATE UNIQUE INDEX idx_users_username_lower ON users(LOWER(username));
CREATE INDEX idx_users_email_lower ON users(LOWER(email));

CREATE TABLE accounts (
    user_id                         BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    activation_key                  TEXT NOT NULL,
    activation_key_created          TIMESTAMPTZ NOT NULL,
    activation_notification_sent    BOOLEAN NOT NULL DEFAULT FALSE,
    email_unconfirmed               TEXT NOT NULL DEFAULT '',
    email_confirmation_key          TEXT NOT NULL DEFAULT '',
    email_confirmation_key_created  TIMESTAMPTZ,
    last_active                     TIMESTAMPTZ
);

CREATE INDEX idx_accounts_activation_key ON accounts(activation_key);
"#,
    // v2: profiles
    r#"
CREATE TABLE profiles (
    user_id     BIGINT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    mugshot     TEXT,
    gender      TEXT,
    birth_date  DATE,
    website     TEXT NOT NULL DEFAULT '',
    location    TEXT NOT NULL DEFAULT '',
    about       TEXT NOT NULL DEFAULT '',
    privacy     TEXT NOT NULL DEFAULT 'registered',
    language    TEXT NOT NULL DEFAULT 'en'
);
"#,
    // v3: per-object permissions
    r#"
CREATE TABLE object_permissions (
    id          BIGSERIAL PRIMARY KEY,
    user_id     BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    permission  TEXT NOT NULL,
    object_type TEXT NOT NULL,
    object_id   BIGINT NOT NULL,
    UNIQUE(user_id, permission, object_type, object_id)
);

CREATE INDEX idx_object_permissions_object ON object_permissions(object_type, object_id);
"#,
    // v4: private messages
    r#"
CREATE TABLE messages (
    id                  BIGSERIAL PRIMARY KEY,
    sender_id           BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    parent_id           BIGINT REFERENCES messages(id) ON DELETE SET NULL,
    body                TEXT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    sent_at             TIMESTAMPTZ,
    sender_deleted_at   TIMESTAMPTZ
);

CREATE INDEX idx_messages_sender_id ON messages(sender_id);
CREATE INDEX idx_messages_sent_at ON messages(sent_at);

CREATE TABLE message_recipients (
    id          BIGSERIAL PRIMARY KEY,
    message_id  BIGINT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    user_id     BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    read_at     TIMESTAMPTZ,
    deleted_at  TIMESTAMPTZ,
    replied_at  TIMESTAMPTZ,
    UNIQUE(message_id, user_id)
);

CREATE INDEX idx_message_recipients_user_id ON message_recipients(user_id);

CREATE TABLE message_contacts (
    id                  BIGSERIAL PRIMARY KEY,
    from_user_id        BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    to_user_id          BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    latest_message_id   BIGINT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    UNIQUE(from_user_id, to_user_id)
);

CREATE INDEX idx_message_contacts_to_user_id ON message_contacts(to_user_id);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
    }

    #[test]
    fn test_first_migration_contains_users_and_accounts() {
        let first = MIGRATIONS[0];
        assert!(first.contains("CREATE TABLE users"));
        assert!(first.contains("CREATE TABLE accounts"));
        assert!(first.contains("activation_key"));
        assert!(first.contains("email_unconfirmed"));
        assert!(first.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_migrations_are_valid_sql() {
        for migration in MIGRATIONS {
            assert!(!migration.trim().is_empty());
            assert!(migration.contains("CREATE TABLE") || migration.contains("ALTER TABLE"));
        }
    }

    #[test]
    fn test_message_migration_tables() {
        let messages = MIGRATIONS[3];
        assert!(messages.contains("CREATE TABLE messages"));
        assert!(messages.contains("sender_deleted_at"));
        assert!(messages.contains("CREATE TABLE message_recipients"));
        assert!(messages.contains("UNIQUE(message_id, user_id)"));
        assert!(messages.contains("CREATE TABLE message_contacts"));
        assert!(messages.contains("UNIQUE(from_user_id, to_user_id)"));
    }
}
