//! Field-level input validation for userbase.
//!
//! Validation failures never escape as faults: each one names the form
//! field it belongs to so a host application can render it next to the
//! input.

use thiserror::Error;
use validator::ValidateEmail;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 30;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Username is empty.
    #[error("username is required")]
    UsernameEmpty,

    /// Username is too long.
    #[error("username must be at most {MAX_USERNAME_LENGTH} characters")]
    UsernameTooLong,

    /// Username contains invalid characters.
    #[error("username must contain only letters, numbers, dots and underscores")]
    UsernameInvalidChars,

    /// Username is on the forbidden list.
    #[error("this username is not allowed")]
    UsernameForbidden,

    /// Username belongs to an active user.
    #[error("this username is already taken")]
    UsernameTaken,

    /// Username belongs to an account that was never activated.
    #[error("this username is already taken but not yet activated")]
    UsernameNotActivated,

    /// Email is empty.
    #[error("email is required")]
    EmailEmpty,

    /// Email is too long.
    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    /// Email format is invalid.
    #[error("invalid email format")]
    EmailInvalidFormat,

    /// Email is used by another account.
    #[error("this email is already in use, please supply a different email")]
    EmailInUse,

    /// New email equals the current one.
    #[error("you're already known under this email")]
    EmailUnchanged,

    /// Password is too short.
    #[error("password must be at least {} characters", crate::auth::password::MIN_PASSWORD_LENGTH)]
    PasswordTooShort,

    /// Password is too long.
    #[error("password must be at most {} characters", crate::auth::password::MAX_PASSWORD_LENGTH)]
    PasswordTooLong,

    /// The two password fields differ.
    #[error("the two password fields didn't match")]
    PasswordMismatch,

    /// Old password given for a password change is wrong.
    #[error("your old password was entered incorrectly")]
    PasswordIncorrect,

    /// First or last name too long.
    #[error("name must be at most {0} characters")]
    NameTooLong(usize),

    /// Website is not an http(s) URL.
    #[error("enter a valid URL")]
    WebsiteInvalid,

    /// Location too long.
    #[error("location must be at most {0} characters")]
    LocationTooLong(usize),

    /// About text too long or contains control characters.
    #[error("about text must be at most {0} characters of printable text")]
    AboutInvalid(usize),

    /// Birth date lies in the future.
    #[error("birth date cannot be in the future")]
    BirthDateInFuture,

    /// Language is not offered by this site.
    #[error("language '{0}' is not available")]
    LanguageUnsupported(String),

    /// Mugshot is not an http(s) URL.
    #[error("mugshot must be an http or https URL")]
    MugshotInvalid,

    /// Message body is blank.
    #[error("message body cannot be empty")]
    MessageBodyEmpty,

    /// Message body is too long.
    #[error("message body must be at most {0} characters")]
    MessageBodyTooLong(usize),

    /// No recipient given.
    #[error("at least one recipient is required")]
    NoRecipients,

    /// Recipient does not exist.
    #[error("user '{0}' does not exist")]
    RecipientUnknown(String),

    /// Recipient cannot receive messages.
    #[error("user '{0}' is not active")]
    RecipientInactive(String),

    /// Sender listed themselves as recipient.
    #[error("you cannot send a message to yourself")]
    RecipientIsSender,
}

impl ValidationError {
    /// Name of the form field the error belongs to.
    pub fn field(&self) -> &'static str {
        use ValidationError::*;
        match self {
            UsernameEmpty | UsernameTooLong | UsernameInvalidChars | UsernameForbidden
            | UsernameTaken | UsernameNotActivated => "username",
            EmailEmpty | EmailTooLong | EmailInvalidFormat | EmailInUse | EmailUnchanged => {
                "email"
            }
            PasswordTooShort | PasswordTooLong => "password1",
            PasswordMismatch => "password2",
            PasswordIncorrect => "old_password",
            NameTooLong(_) => "name",
            WebsiteInvalid => "website",
            LocationTooLong(_) => "location",
            AboutInvalid(_) => "about",
            BirthDateInFuture => "birth_date",
            LanguageUnsupported(_) => "language",
            MugshotInvalid => "mugshot",
            MessageBodyEmpty | MessageBodyTooLong(_) => "body",
            NoRecipients | RecipientUnknown(_) | RecipientInactive(_) | RecipientIsSender => "to",
        }
    }
}

/// Check if a username is on the forbidden list (case-insensitive).
pub fn is_forbidden_username(username: &str, forbidden: &[String]) -> bool {
    forbidden.iter().any(|f| f.eq_ignore_ascii_case(username))
}

/// Validate the shape of a username.
///
/// Requirements:
/// - 1-30 characters
/// - Letters, digits, `.` and `_` only
/// - Not on the forbidden list
///
/// # Examples
///
/// ```
/// use userbase::auth::validation::validate_username;
///
/// let forbidden = vec!["signup".to_string()];
/// assert!(validate_username("john.doe", &forbidden).is_ok());
/// assert!(validate_username("john doe", &forbidden).is_err());
/// assert!(validate_username("SignUp", &forbidden).is_err());
/// ```
pub fn validate_username(username: &str, forbidden: &[String]) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::UsernameEmpty);
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::UsernameTooLong);
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ValidationError::UsernameInvalidChars);
    }
    if is_forbidden_username(username, forbidden) {
        return Err(ValidationError::UsernameForbidden);
    }
    Ok(())
}

/// Validate a required email address.
///
/// # Examples
///
/// ```
/// use userbase::auth::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("").is_err());
/// assert!(validate_email("invalid").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::EmailEmpty);
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if !email.validate_email() {
        return Err(ValidationError::EmailInvalidFormat);
    }
    Ok(())
}

/// Validate a password pair from a signup or password-change form.
pub fn validate_password_pair(password1: &str, password2: &str) -> Result<(), ValidationError> {
    crate::auth::password::validate_password(password1).map_err(|e| match e {
        crate::auth::PasswordError::TooLong => ValidationError::PasswordTooLong,
        _ => ValidationError::PasswordTooShort,
    })?;
    if password1 != password2 {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Normalize an email for storage: trimmed, domain part lower-cased.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}
