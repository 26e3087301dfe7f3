//! Account lifecycle service for userbase.
//!
//! Signup, activation, expiry sweeps, sign-in, password and email changes.
//! Token lookups that fail return `Ok(None)`; only infrastructure failures
//! and form validation come back as errors.

use std::collections::HashMap;

use chrono::Duration;
use tracing::{debug, info, warn};

use super::emails;
use super::repository::AccountRepository;
use super::types::{Account, ActivationStatus, SignupRequest};
use crate::app::Application;
use crate::auth::permission::assign_default_permissions;
use crate::auth::token::{self, generate_key, is_key_format, ACTIVATED};
use crate::auth::validation::{
    normalize_email, validate_email, validate_password_pair, validate_username, ValidationError,
};
use crate::auth::{hash_password, verify_password, AuthError, PasswordError};
use crate::db::{DbConnection, NewUser, User, UserRepository, UserUpdate};
use crate::profile::ProfileRepository;
use crate::{Result, UserbaseError};

/// Length of a generated username.
const GENERATED_USERNAME_LENGTH: usize = 5;

/// Service for account lifecycle operations.
pub struct AccountService<'a> {
    app: &'a Application,
}

impl<'a> AccountService<'a> {
    /// Create a new AccountService on the given application.
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    fn activation_days(&self) -> i64 {
        self.app.config().accounts.activation_days
    }

    /// Validate a signup form and create the user.
    ///
    /// # Errors
    ///
    /// Returns a validation error if:
    /// - The username is malformed, forbidden or taken
    /// - The email is malformed or already in use
    /// - The passwords are too short or do not match
    pub async fn signup(&self, request: &SignupRequest) -> Result<User> {
        let settings = &self.app.config().accounts;

        let requested_username = request.username.trim();
        if !settings.without_usernames {
            validate_username(requested_username, &settings.forbidden_usernames)?;
        }
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password_pair(&request.password1, &request.password2)?;

        let mut conn = self.app.db().acquire().await?;
        let username = if settings.without_usernames {
            generate_username(&mut conn, &email).await?
        } else {
            if let Some(existing) = UserRepository::new(&mut conn)
                .get_by_username(requested_username)
                .await?
            {
                let pending = AccountRepository::new(&mut conn)
                    .get_by_user_id(existing.id)
                    .await?
                    .is_some_and(|a| !a.is_activated());
                return Err(if pending {
                    ValidationError::UsernameNotActivated
                } else {
                    ValidationError::UsernameTaken
                }
                .into());
            }
            requested_username.to_string()
        };
        if UserRepository::new(&mut conn)
            .email_exists(&email, None)
            .await?
        {
            return Err(ValidationError::EmailInUse.into());
        }
        drop(conn);

        let active = !settings.activation_required;
        self.create_user(&username, &email, &request.password1, active, !active)
            .await
    }

    /// Create a user with its account, profile and default permissions in
    /// one transaction.
    ///
    /// An active user gets the used-key sentinel straight away. An inactive
    /// one gets a fresh activation key, mailed when `send_email` is set.
    ///
    /// The user is committed before the activation mail goes out. If the
    /// transport fails the error is returned and the pending user stays;
    /// resend with [`AccountService::send_activation_email`] instead of
    /// creating the user again.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed or forbidden username, a
    /// malformed email or a password outside the length policy. Uniqueness
    /// is checked by [`AccountService::signup`].
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        active: bool,
        send_email: bool,
    ) -> Result<User> {
        let settings = &self.app.config().accounts;
        validate_username(username, &settings.forbidden_usernames)?;
        let email = &normalize_email(email);
        validate_email(email)?;
        let now = self.app.now();
        let password_hash = hash_password(password)?;
        let key = if active {
            ACTIVATED.to_string()
        } else {
            generate_key(username)
        };
        let language = settings
            .languages
            .first()
            .map(String::as_str)
            .unwrap_or("en");

        let mut tx = self.app.db().begin().await?;
        let user = UserRepository::new(&mut tx)
            .create(&NewUser::new(username, email, password_hash, now).with_active(active))
            .await?;
        AccountRepository::new(&mut tx)
            .create(user.id, &key, now)
            .await?;
        ProfileRepository::new(&mut tx)
            .create(user.id, settings.default_privacy, language)
            .await?;
        assign_default_permissions(&mut tx, user.id).await?;
        tx.commit().await?;

        info!(user_id = user.id, username = %user.username, active, "User created");

        if send_email && !active {
            self.deliver_activation(&user, &key).await?;
        }
        Ok(user)
    }

    /// Create a user that must be activated through the emailed link.
    pub async fn create_inactive_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        self.create_user(username, email, password, false, true).await
    }

    /// Send the activation email again for a user that is still pending.
    ///
    /// Returns false when there is nothing to activate.
    pub async fn send_activation_email(&self, user: &User) -> Result<bool> {
        let account = {
            let mut conn = self.app.db().acquire().await?;
            AccountRepository::new(&mut conn)
                .get_by_user_id(user.id)
                .await?
        };
        match account {
            Some(account) if !account.is_activated() => {
                self.deliver_activation(user, &account.activation_key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deliver_activation(&self, user: &User, key: &str) -> Result<()> {
        let email = emails::activation_email(self.app.config(), &user.username, &user.email, key)?;
        self.app.mailer().send(&email).await?;
        debug!(user_id = user.id, "Activation email sent");
        Ok(())
    }

    /// Activate `username` with `token`.
    ///
    /// Returns `None` for a malformed, unknown, consumed or expired token;
    /// the account is left untouched in that case.
    pub async fn activate_user(&self, username: &str, token: &str) -> Result<Option<User>> {
        if !is_key_format(token) {
            return Ok(None);
        }
        let now = self.app.now();

        let mut tx = self.app.db().begin().await?;
        let Some(user) = UserRepository::new(&mut tx).get_by_username(username).await? else {
            return Ok(None);
        };
        let Some(account) = AccountRepository::new(&mut tx)
            .get_by_user_id(user.id)
            .await?
        else {
            return Ok(None);
        };
        if account.activation_key != token
            || account.activation_key_expired(self.activation_days(), now)
        {
            return Ok(None);
        }
        if !AccountRepository::new(&mut tx)
            .consume_activation_key(user.id, token)
            .await?
        {
            return Ok(None);
        }
        let user = UserRepository::new(&mut tx)
            .update(user.id, &UserUpdate::new().is_active(true))
            .await?
            .ok_or_else(|| UserbaseError::NotFound("user".to_string()))?;
        tx.commit().await?;

        info!(user_id = user.id, username = %user.username, "User activated");
        Ok(Some(user))
    }

    /// Tell apart the reasons an activation link may not work, without
    /// using it.
    pub async fn check_expired_activation(
        &self,
        username: &str,
        token: &str,
    ) -> Result<ActivationStatus> {
        if !is_key_format(token) {
            return Ok(ActivationStatus::Invalid);
        }
        let mut conn = self.app.db().acquire().await?;
        let Some(user) = UserRepository::new(&mut conn)
            .get_by_username(username)
            .await?
        else {
            return Ok(ActivationStatus::Invalid);
        };
        let Some(account) = AccountRepository::new(&mut conn)
            .get_by_user_id(user.id)
            .await?
        else {
            return Ok(ActivationStatus::Invalid);
        };

        let status = if account.is_activated() {
            ActivationStatus::AlreadyActivated
        } else if account.activation_key != token {
            ActivationStatus::Invalid
        } else if account.activation_key_expired(self.activation_days(), self.app.now()) {
            ActivationStatus::Expired
        } else {
            ActivationStatus::Valid
        };
        Ok(status)
    }

    /// Issue and mail a fresh activation key for an expired one.
    ///
    /// Only does anything when `activation_retry` is enabled and `token`
    /// is the expired key of `username`. Returns whether a key was issued.
    pub async fn reissue_activation(&self, username: &str, token: &str) -> Result<bool> {
        if !self.app.config().accounts.activation_retry {
            return Ok(false);
        }
        if self.check_expired_activation(username, token).await? != ActivationStatus::Expired {
            return Ok(false);
        }

        let mut conn = self.app.db().acquire().await?;
        let Some(user) = UserRepository::new(&mut conn)
            .get_by_username(username)
            .await?
        else {
            return Ok(false);
        };
        let key = generate_key(&user.username);
        AccountRepository::new(&mut conn)
            .set_activation_key(user.id, &key, self.app.now())
            .await?;
        drop(conn);

        info!(user_id = user.id, username = %user.username, "Activation key reissued");
        self.deliver_activation(&user, &key).await?;
        Ok(true)
    }

    /// Delete every inactive, non-staff user whose activation key expired.
    ///
    /// Returns the deleted users.
    pub async fn delete_expired_users(&self) -> Result<Vec<User>> {
        let now = self.app.now();
        let days = self.activation_days();

        let mut tx = self.app.db().begin().await?;
        let pending = AccountRepository::new(&mut tx).list_pending().await?;
        let users = load_users(&mut tx, &pending).await?;

        let mut deleted = Vec::new();
        for account in &pending {
            if !token::is_expired(account.activation_key_created, days, now) {
                continue;
            }
            let Some(user) = users.get(&account.user_id) else {
                continue;
            };
            if user.is_staff || user.is_active {
                continue;
            }
            if UserRepository::new(&mut tx).delete(user.id).await? {
                deleted.push(user.clone());
            }
        }
        tx.commit().await?;

        for user in &deleted {
            info!(user_id = user.id, username = %user.username, "Expired user deleted");
        }
        Ok(deleted)
    }

    /// Remind pending users whose key expires within the notify window.
    ///
    /// Each user is reminded once per key. Returns the reminded users.
    pub async fn notify_almost_expired(&self) -> Result<Vec<User>> {
        let settings = &self.app.config().accounts;
        if !settings.activation_notify {
            return Ok(Vec::new());
        }
        let now = self.app.now();

        let mut conn = self.app.db().acquire().await?;
        let pending = AccountRepository::new(&mut conn).list_pending().await?;
        let users = load_users(&mut conn, &pending).await?;

        let mut notified = Vec::new();
        for account in &pending {
            if account.activation_notification_sent {
                continue;
            }
            let Some(user) = users.get(&account.user_id) else {
                continue;
            };
            if user.is_staff || user.is_active || user.email.is_empty() {
                continue;
            }
            let expires = account.activation_expires_at(settings.activation_days);
            let window_opens = expires - Duration::days(settings.activation_notify_days);
            if now < window_opens || now > expires {
                continue;
            }

            let email = emails::activation_reminder_email(
                self.app.config(),
                &user.username,
                &user.email,
                &account.activation_key,
                expires,
            )?;
            self.app.mailer().send(&email).await?;
            AccountRepository::new(&mut conn)
                .set_notification_sent(user.id)
                .await?;
            info!(user_id = user.id, username = %user.username, "Activation reminder sent");
            notified.push(user.clone());
        }
        Ok(notified)
    }

    /// Sign in with a username or, when `identification` contains `@`, an
    /// email address.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown user or a
    /// wrong password and [`AuthError::Inactive`] for an inactive account.
    pub async fn signin(&self, identification: &str, password: &str) -> Result<User> {
        let identification = identification.trim();
        let mut conn = self.app.db().acquire().await?;

        let user = if identification.contains('@') {
            UserRepository::new(&mut conn)
                .get_by_email(identification)
                .await?
        } else {
            UserRepository::new(&mut conn)
                .get_by_username(identification)
                .await?
        };
        let Some(user) = user else {
            debug!("Sign-in failed: unknown identification");
            return Err(AuthError::InvalidCredentials.into());
        };

        verify_password(password, &user.password).map_err(|e| match e {
            PasswordError::VerificationFailed => AuthError::InvalidCredentials,
            other => AuthError::Password(other.to_string()),
        })?;
        if !user.is_active {
            return Err(AuthError::Inactive.into());
        }

        let now = self.app.now();
        let user = UserRepository::new(&mut conn)
            .update(user.id, &UserUpdate::new().last_login(now))
            .await?
            .ok_or_else(|| UserbaseError::NotFound("user".to_string()))?;
        AccountRepository::new(&mut conn)
            .touch_last_active(user.id, now)
            .await?;

        info!(user_id = user.id, username = %user.username, "User signed in");
        Ok(user)
    }

    /// Stamp the last time a user was seen.
    pub async fn touch_last_active(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.app.db().acquire().await?;
        AccountRepository::new(&mut conn)
            .touch_last_active(user_id, self.app.now())
            .await
    }

    /// Change a password after checking the current one.
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password1: &str,
        new_password2: &str,
    ) -> Result<()> {
        let mut conn = self.app.db().acquire().await?;
        let user = UserRepository::new(&mut conn)
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("user".to_string()))?;

        if verify_password(old_password, &user.password).is_err() {
            return Err(ValidationError::PasswordIncorrect.into());
        }
        validate_password_pair(new_password1, new_password2)?;

        let hash = hash_password(new_password1)?;
        UserRepository::new(&mut conn)
            .update(user_id, &UserUpdate::new().password(hash))
            .await?;

        info!(user_id, username = %user.username, "Password changed");
        Ok(())
    }

    /// Start an email change: store the new address unconfirmed and mail
    /// a confirmation link to it, plus a notice to the old address.
    pub async fn change_email(&self, user_id: i64, new_email: &str) -> Result<Account> {
        let new_email = normalize_email(new_email);
        validate_email(&new_email)?;

        let mut conn = self.app.db().acquire().await?;
        let user = UserRepository::new(&mut conn)
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("user".to_string()))?;
        if user.email.eq_ignore_ascii_case(&new_email) {
            return Err(ValidationError::EmailUnchanged.into());
        }
        if UserRepository::new(&mut conn)
            .email_exists(&new_email, Some(user.id))
            .await?
        {
            return Err(ValidationError::EmailInUse.into());
        }

        let key = generate_key(&new_email);
        let mut accounts = AccountRepository::new(&mut conn);
        accounts
            .set_email_change(user.id, &new_email, &key, self.app.now())
            .await?;
        let account = accounts
            .get_by_user_id(user.id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("account".to_string()))?;
        drop(conn);

        let config = self.app.config();
        let confirmation = emails::confirm_email_new(config, &user.username, &new_email, &key)?;
        self.app.mailer().send(&confirmation).await?;
        if !user.email.is_empty() {
            let notice = emails::confirm_email_old(config, &user.username, &user.email, &new_email);
            self.app.mailer().send(&notice).await?;
        }

        info!(user_id, username = %user.username, "Email change requested");
        Ok(account)
    }

    /// Confirm a pending email change.
    ///
    /// Returns `None` for a malformed, wrong, used or expired token; the
    /// primary email is left unchanged in that case.
    pub async fn confirm_email(&self, username: &str, token: &str) -> Result<Option<User>> {
        if !is_key_format(token) {
            return Ok(None);
        }
        let now = self.app.now();

        let mut tx = self.app.db().begin().await?;
        let Some(user) = UserRepository::new(&mut tx).get_by_username(username).await? else {
            return Ok(None);
        };
        let Some(account) = AccountRepository::new(&mut tx)
            .get_by_user_id(user.id)
            .await?
        else {
            return Ok(None);
        };
        if !account.has_pending_email()
            || account.email_confirmation_key != token
            || account.email_confirmation_expired(self.activation_days(), now)
        {
            return Ok(None);
        }
        if UserRepository::new(&mut tx)
            .email_exists(&account.email_unconfirmed, Some(user.id))
            .await?
        {
            warn!(user_id = user.id, "Confirmed address was taken meanwhile");
            return Ok(None);
        }

        let user = UserRepository::new(&mut tx)
            .update(user.id, &UserUpdate::new().email(account.email_unconfirmed.clone()))
            .await?
            .ok_or_else(|| UserbaseError::NotFound("user".to_string()))?;
        AccountRepository::new(&mut tx)
            .clear_email_change(user.id)
            .await?;
        tx.commit().await?;

        info!(user_id = user.id, username = %user.username, "Email change confirmed");
        Ok(Some(user))
    }

    /// Get the account of a user.
    pub async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        let mut conn = self.app.db().acquire().await?;
        AccountRepository::new(&mut conn).get_by_user_id(user_id).await
    }

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        let mut conn = self.app.db().acquire().await?;
        UserRepository::new(&mut conn).get_by_username(username).await
    }
}

/// Users owning `accounts`, keyed by ID.
async fn load_users(conn: &mut DbConnection, accounts: &[Account]) -> Result<HashMap<i64, User>> {
    let ids: Vec<i64> = accounts.iter().map(|a| a.user_id).collect();
    let users = UserRepository::new(conn).get_many(&ids).await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

/// Derive an unused username from an email address.
async fn generate_username(conn: &mut DbConnection, email: &str) -> Result<String> {
    loop {
        let mut candidate = generate_key(email);
        candidate.truncate(GENERATED_USERNAME_LENGTH);
        if !UserRepository::new(conn).username_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
}
