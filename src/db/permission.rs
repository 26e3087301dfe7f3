//! Object-level permission store.
//!
//! A permission row grants one user one named permission on one object
//! (a profile or a user). Rows disappear with the user they belong to.

use std::collections::BTreeSet;

use super::DbConnection;
use crate::Result;

/// Permission to view a profile regardless of its privacy level.
pub const VIEW_PROFILE: &str = "view_profile";
/// Permission to edit a profile.
pub const CHANGE_PROFILE: &str = "change_profile";
/// Permission to edit a user record.
pub const CHANGE_USER: &str = "change_user";
/// Permission to delete a user record.
pub const DELETE_USER: &str = "delete_user";

/// Kind of object a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A user record.
    User,
    /// A profile (keyed by its user ID).
    Profile,
}

impl ObjectKind {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::User => "user",
            ObjectKind::Profile => "profile",
        }
    }
}

/// Reference to a permission target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object ID.
    pub id: i64,
}

impl ObjectRef {
    /// The user record with this ID.
    pub fn user(id: i64) -> Self {
        Self {
            kind: ObjectKind::User,
            id,
        }
    }

    /// The profile owned by the user with this ID.
    pub fn profile(user_id: i64) -> Self {
        Self {
            kind: ObjectKind::Profile,
            id: user_id,
        }
    }
}

/// Repository for object permission rows.
pub struct ObjectPermissionRepository<'c> {
    conn: &'c mut DbConnection,
}

impl<'c> ObjectPermissionRepository<'c> {
    /// Create a new repository on the given connection.
    pub fn new(conn: &'c mut DbConnection) -> Self {
        Self { conn }
    }

    /// Grant `permission` on `object` to `user_id`. Granting twice is a no-op.
    ///
    /// Returns true if a new grant was written.
    pub async fn assign(&mut self, permission: &str, user_id: i64, object: ObjectRef) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO object_permissions (user_id, permission, object_type, object_id)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, permission, object_type, object_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(permission)
        .bind(object.kind.as_str())
        .bind(object.id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a grant. Returns true if one existed.
    pub async fn remove(&mut self, permission: &str, user_id: i64, object: ObjectRef) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM object_permissions
             WHERE user_id = $1 AND permission = $2 AND object_type = $3 AND object_id = $4",
        )
        .bind(user_id)
        .bind(permission)
        .bind(object.kind.as_str())
        .bind(object.id)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Names of every permission `user_id` holds on `object`.
    pub async fn get_perms(&mut self, user_id: i64, object: ObjectRef) -> Result<BTreeSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT permission FROM object_permissions
             WHERE user_id = $1 AND object_type = $2 AND object_id = $3",
        )
        .bind(user_id)
        .bind(object.kind.as_str())
        .bind(object.id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(names.into_iter().collect())
    }

    /// Check a single grant.
    pub async fn has_perm(&mut self, user_id: i64, permission: &str, object: ObjectRef) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM object_permissions
                           WHERE user_id = $1 AND permission = $2
                             AND object_type = $3 AND object_id = $4)",
        )
        .bind(user_id)
        .bind(permission)
        .bind(object.kind.as_str())
        .bind(object.id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(exists)
    }
}
