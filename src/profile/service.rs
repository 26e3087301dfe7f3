//! Profile service for userbase.

use tracing::info;

use super::repository::ProfileRepository;
use super::types::{can_view_profile, Page, Privacy, ProfileUpdate, ProfileView, UserProfile};
use crate::app::Application;
use crate::db::{
    ObjectPermissionRepository, ObjectRef, User, UserRepository, UserUpdate, CHANGE_PROFILE,
    VIEW_PROFILE,
};
use crate::{Result, UserbaseError};

/// Default page size for the profile list.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Service for profile operations.
pub struct ProfileService<'a> {
    app: &'a Application,
}

impl<'a> ProfileService<'a> {
    /// Create a new ProfileService on the given application.
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Load a user and their profile by username.
    pub async fn get_profile(&self, username: &str) -> Result<Option<UserProfile>> {
        let mut conn = self.app.db().acquire().await?;
        let Some(user) = UserRepository::new(&mut conn).get_by_username(username).await? else {
            return Ok(None);
        };
        let profile = ProfileRepository::new(&mut conn)
            .get_by_user_id(user.id)
            .await?;
        Ok(profile.map(|profile| UserProfile { user, profile }))
    }

    /// Whether `viewer` may see `profile`.
    pub async fn can_view(&self, viewer: Option<&User>, profile: &UserProfile) -> Result<bool> {
        let has_view_perm = match viewer {
            Some(v) if v.is_active && v.id != profile.user.id => {
                let mut conn = self.app.db().acquire().await?;
                ObjectPermissionRepository::new(&mut conn)
                    .has_perm(v.id, VIEW_PROFILE, ObjectRef::profile(profile.user.id))
                    .await?
            }
            _ => false,
        };
        Ok(can_view_profile(profile, profile.user.id, viewer, has_view_perm))
    }

    /// The profile of `username` as `viewer` may see it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown user and `Permission` when the
    /// privacy level hides the profile from the viewer.
    pub async fn get_profile_for(&self, viewer: Option<&User>, username: &str) -> Result<ProfileView> {
        let profile = self
            .get_profile(username)
            .await?
            .ok_or_else(|| UserbaseError::NotFound(format!("profile '{username}'")))?;

        if !self.can_view(viewer, &profile).await? {
            return Err(UserbaseError::Permission(format!(
                "profile of '{}' is not visible",
                profile.user.username
            )));
        }

        Ok(self.view(&profile, viewer))
    }

    /// Edit the profile of `username` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns `Permission` unless `actor` holds `change_profile` on the
    /// profile, and a validation error for bad field values.
    pub async fn update_profile(
        &self,
        actor: &User,
        username: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        let target = self
            .get_profile(username)
            .await?
            .ok_or_else(|| UserbaseError::NotFound(format!("profile '{username}'")))?;

        let allowed = self
            .app
            .permissions()
            .has_perm(actor, CHANGE_PROFILE, ObjectRef::profile(target.user.id))
            .await?;
        if !allowed {
            return Err(UserbaseError::Permission(format!(
                "{CHANGE_PROFILE} required on '{}'",
                target.user.username
            )));
        }

        update.validate(&self.app.config().accounts, self.app.now().date_naive())?;

        let mut tx = self.app.db().begin().await?;
        let profile = ProfileRepository::new(&mut tx)
            .update(target.user.id, update)
            .await?
            .ok_or_else(|| UserbaseError::NotFound(format!("profile '{username}'")))?;

        let user = if update.touches_user() {
            let mut user_update = UserUpdate::new();
            if let Some(ref first) = update.first_name {
                user_update = user_update.first_name(first.trim());
            }
            if let Some(ref last) = update.last_name {
                user_update = user_update.last_name(last.trim());
            }
            UserRepository::new(&mut tx)
                .update(target.user.id, &user_update)
                .await?
                .ok_or_else(|| UserbaseError::NotFound(format!("user '{username}'")))?
        } else {
            target.user
        };
        tx.commit().await?;

        info!(username = %user.username, actor = %actor.username, "Profile updated");
        Ok(UserProfile { user, profile })
    }

    /// One page of the profile list for `viewer`, ordered by username.
    ///
    /// Anonymous viewers see open profiles, signed-in users also see
    /// registered ones and staff see every profile including inactive users.
    pub async fn list_profiles(
        &self,
        viewer: Option<&User>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<ProfileView>> {
        let viewer = viewer.filter(|v| v.is_active);
        let is_staff = viewer.is_some_and(|v| v.is_staff);
        if self.app.config().accounts.disable_profile_list && !is_staff {
            return Err(UserbaseError::Permission(
                "the profile list is disabled".to_string(),
            ));
        }

        let page = page.max(1);
        let per_page = if per_page == 0 { DEFAULT_PER_PAGE } else { per_page };
        let (privacy, active_only): (Option<&[Privacy]>, bool) = if is_staff {
            (None, false)
        } else {
            (Some(Privacy::listable_for(viewer.is_some())), true)
        };
        let offset = i64::from(page - 1) * i64::from(per_page);

        let mut conn = self.app.db().acquire().await?;
        let mut repo = ProfileRepository::new(&mut conn);
        let total = repo.count(privacy, active_only).await?;
        let profiles = repo
            .list(privacy, active_only, i64::from(per_page), offset)
            .await?;

        let ids: Vec<i64> = profiles.iter().map(|p| p.user_id).collect();
        let users = UserRepository::new(&mut conn).get_many(&ids).await?;
        drop(conn);

        let mut items = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if let Some(user) = users.iter().find(|u| u.id == profile.user_id) {
                let entry = UserProfile {
                    user: user.clone(),
                    profile,
                };
                items.push(self.view(&entry, viewer));
            }
        }

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    fn view(&self, profile: &UserProfile, viewer: Option<&User>) -> ProfileView {
        let config = self.app.config();
        let is_owner = viewer.is_some_and(|v| v.id == profile.user.id);
        let show_email = !config.accounts.hide_email || is_owner;
        ProfileView::build(profile, show_email, &config.mugshot, self.app.now().date_naive())
    }
}
