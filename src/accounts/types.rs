//! Account types for userbase.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::token::{self, ACTIVATED};

/// Per-user account record: activation and pending email change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Account {
    /// Owning user.
    pub user_id: i64,
    /// Live activation key, or [`ACTIVATED`] once used.
    #[serde(skip_serializing)]
    pub activation_key: String,
    /// When the current activation key was issued.
    pub activation_key_created: DateTime<Utc>,
    /// Whether the expiry reminder went out for the current key.
    pub activation_notification_sent: bool,
    /// Address waiting for confirmation (empty when none).
    pub email_unconfirmed: String,
    /// Key that confirms `email_unconfirmed` (empty when none).
    #[serde(skip_serializing)]
    pub email_confirmation_key: String,
    /// When the confirmation key was issued.
    pub email_confirmation_key_created: Option<DateTime<Utc>>,
    /// Last time the user was seen.
    pub last_active: Option<DateTime<Utc>>,
}

impl Account {
    /// Whether the activation key has been used.
    pub fn is_activated(&self) -> bool {
        self.activation_key == ACTIVATED
    }

    /// When the activation key stops being valid.
    pub fn activation_expires_at(&self, activation_days: i64) -> DateTime<Utc> {
        token::expires_at(self.activation_key_created, activation_days)
    }

    /// Whether the activation key can no longer be used, either because it
    /// was used already or because it expired.
    pub fn activation_key_expired(&self, activation_days: i64, now: DateTime<Utc>) -> bool {
        self.is_activated() || token::is_expired(self.activation_key_created, activation_days, now)
    }

    /// Lifecycle state at `now`.
    pub fn state(&self, activation_days: i64, now: DateTime<Utc>) -> AccountState {
        if self.is_activated() {
            AccountState::Active
        } else if token::is_expired(self.activation_key_created, activation_days, now) {
            AccountState::Expired
        } else {
            AccountState::Pending
        }
    }

    /// Whether an email change is waiting for confirmation.
    pub fn has_pending_email(&self) -> bool {
        !self.email_unconfirmed.is_empty() && !self.email_confirmation_key.is_empty()
    }

    /// Whether the confirmation key is past its window.
    pub fn email_confirmation_expired(&self, activation_days: i64, now: DateTime<Utc>) -> bool {
        match self.email_confirmation_key_created {
            Some(created) => token::is_expired(created, activation_days, now),
            None => true,
        }
    }
}

/// Where an account is in its activation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    /// Waiting for activation.
    Pending,
    /// Activated.
    Active,
    /// Never activated and past the activation window.
    Expired,
}

/// Outcome of checking an activation link without using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    /// The key is live and would activate the account.
    Valid,
    /// The key matches but its window has passed.
    Expired,
    /// The account was activated already.
    AlreadyActivated,
    /// Malformed key, unknown user or a key that does not match.
    Invalid,
}

/// Signup form input.
#[derive(Debug, Clone, Default)]
pub struct SignupRequest {
    /// Desired username. Ignored when usernames are generated.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password.
    pub password1: String,
    /// Password confirmation.
    pub password2: String,
}

impl SignupRequest {
    /// Create a request whose confirmation equals the password.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            email: email.into(),
            password2: password.clone(),
            password1: password,
        }
    }

    /// Set a different confirmation password.
    pub fn with_confirmation(mut self, password2: impl Into<String>) -> Self {
        self.password2 = password2.into();
        self
    }
}
