//! Object permission checks for userbase.
//!
//! Every user receives a fixed set of permissions on their own profile
//! and user record at signup. Superusers hold every permission.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::app::Application;
use crate::db::{
    DbConnection, ObjectPermissionRepository, ObjectRef, User, UserRepository, CHANGE_PROFILE,
    CHANGE_USER, DELETE_USER, VIEW_PROFILE,
};
use crate::Result;

/// Permissions every user holds on their own objects.
pub fn default_permissions(user_id: i64) -> [(&'static str, ObjectRef); 4] {
    [
        (VIEW_PROFILE, ObjectRef::profile(user_id)),
        (CHANGE_PROFILE, ObjectRef::profile(user_id)),
        (CHANGE_USER, ObjectRef::user(user_id)),
        (DELETE_USER, ObjectRef::user(user_id)),
    ]
}

/// Grant the default permissions to `user_id`.
///
/// Returns the names of the permissions that were missing.
pub async fn assign_default_permissions(
    conn: &mut DbConnection,
    user_id: i64,
) -> Result<Vec<&'static str>> {
    let mut repo = ObjectPermissionRepository::new(conn);
    let mut added = Vec::new();
    for (permission, object) in default_permissions(user_id) {
        if repo.assign(permission, user_id, object).await? {
            added.push(permission);
        }
    }
    Ok(added)
}

/// A default permission restored by [`PermissionService::check_permissions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionFix {
    /// User the permission was given back to.
    pub username: String,
    /// Permission name.
    pub permission: String,
}

/// Service for object permission operations.
pub struct PermissionService<'a> {
    app: &'a Application,
}

impl<'a> PermissionService<'a> {
    /// Create a new PermissionService on the given application.
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Grant `permission` on `object` to a user.
    pub async fn assign(&self, permission: &str, user_id: i64, object: ObjectRef) -> Result<bool> {
        let mut conn = self.app.db().acquire().await?;
        ObjectPermissionRepository::new(&mut conn)
            .assign(permission, user_id, object)
            .await
    }

    /// Revoke a grant.
    pub async fn remove(&self, permission: &str, user_id: i64, object: ObjectRef) -> Result<bool> {
        let mut conn = self.app.db().acquire().await?;
        ObjectPermissionRepository::new(&mut conn)
            .remove(permission, user_id, object)
            .await
    }

    /// Names of the permissions a user holds on `object`.
    pub async fn get_perms(&self, user_id: i64, object: ObjectRef) -> Result<BTreeSet<String>> {
        let mut conn = self.app.db().acquire().await?;
        ObjectPermissionRepository::new(&mut conn)
            .get_perms(user_id, object)
            .await
    }

    /// Whether `user` may exercise `permission` on `object`.
    pub async fn has_perm(&self, user: &User, permission: &str, object: ObjectRef) -> Result<bool> {
        if !user.is_active {
            return Ok(false);
        }
        if user.is_superuser {
            return Ok(true);
        }
        let mut conn = self.app.db().acquire().await?;
        ObjectPermissionRepository::new(&mut conn)
            .has_perm(user.id, permission, object)
            .await
    }

    /// Give every user back any default permission they lost.
    ///
    /// Returns what was restored.
    pub async fn check_permissions(&self) -> Result<Vec<PermissionFix>> {
        let mut tx = self.app.db().begin().await?;
        let users = UserRepository::new(&mut tx).list_all().await?;

        let mut fixes = Vec::new();
        for user in users {
            for permission in assign_default_permissions(&mut tx, user.id).await? {
                fixes.push(PermissionFix {
                    username: user.username.clone(),
                    permission: permission.to_string(),
                });
            }
        }
        tx.commit().await?;

        for fix in &fixes {
            info!(username = %fix.username, permission = %fix.permission, "Permission restored");
        }
        Ok(fixes)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::mailer::MemoryTransport;
    use crate::Database;

    async fn app() -> Application {
        Application::new(
            Arc::new(Database::open_in_memory().await.unwrap()),
            Arc::new(Config::default()),
            Arc::new(MemoryTransport::new()),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_default_permissions() {
        let perms = default_permissions(7);
        assert_eq!(perms.len(), 4);
        assert!(perms.contains(&(VIEW_PROFILE, ObjectRef::profile(7))));
        assert!(perms.contains(&(DELETE_USER, ObjectRef::user(7))));
    }

    #[tokio::test]
    async fn test_check_permissions_restores_missing() {
        let app = app().await;
        let alice = app
            .accounts()
            .create_user("alice", "alice@example.com", "swordfish", true, false)
            .await
            .unwrap();
        app.accounts()
            .create_user("bob", "bob@example.com", "swordfish", true, false)
            .await
            .unwrap();

        assert!(app.permissions().check_permissions().await.unwrap().is_empty());

        let perms = app.permissions();
        assert!(perms
            .remove(CHANGE_PROFILE, alice.id, ObjectRef::profile(alice.id))
            .await
            .unwrap());
        assert!(!perms
            .has_perm(&alice, CHANGE_PROFILE, ObjectRef::profile(alice.id))
            .await
            .unwrap());

        let fixes = perms.check_permissions().await.unwrap();
        assert_eq!(
            fixes,
            vec![PermissionFix {
                username: "alice".to_string(),
                permission: CHANGE_PROFILE.to_string(),
            }]
        );
        assert!(perms
            .has_perm(&alice, CHANGE_PROFILE, ObjectRef::profile(alice.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_superuser_and_inactive() {
        let app = app().await;
        let alice = app
            .accounts()
            .create_user("alice", "alice@example.com", "swordfish", true, false)
            .await
            .unwrap();
        let bob = app
            .accounts()
            .create_user("bob", "bob@example.com", "swordfish", true, false)
            .await
            .unwrap();
        let perms = app.permissions();

        let object = ObjectRef::profile(alice.id);
        assert!(!perms.has_perm(&bob, CHANGE_PROFILE, object).await.unwrap());

        let root = User {
            is_superuser: true,
            ..bob.clone()
        };
        assert!(perms.has_perm(&root, CHANGE_PROFILE, object).await.unwrap());

        let inactive = User {
            is_active: false,
            ..alice.clone()
        };
        assert!(!perms.has_perm(&inactive, CHANGE_PROFILE, object).await.unwrap());

        assert!(perms.assign(VIEW_PROFILE, bob.id, object).await.unwrap());
        assert!(perms.get_perms(bob.id, object).await.unwrap().contains(VIEW_PROFILE));
    }
}
