//! Error types for userbase.

use thiserror::Error;

use crate::auth::validation::ValidationError;

/// Common error type for userbase.
#[derive(Error, Debug)]
pub enum UserbaseError {
    /// Database error.
    ///
    /// This is a generic database error that wraps errors from any database backend.
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Outgoing email could not be built or delivered.
    #[error("mail error: {0}")]
    Mail(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for UserbaseError {
    fn from(e: sqlx::Error) -> Self {
        UserbaseError::Database(e.to_string())
    }
}

impl From<crate::auth::PasswordError> for UserbaseError {
    fn from(e: crate::auth::PasswordError) -> Self {
        match e {
            crate::auth::PasswordError::TooShort => {
                UserbaseError::Validation(ValidationError::PasswordTooShort)
            }
            crate::auth::PasswordError::TooLong => {
                UserbaseError::Validation(ValidationError::PasswordTooLong)
            }
            other => UserbaseError::Auth(crate::auth::AuthError::Password(other.to_string())),
        }
    }
}

/// Result type alias for userbase operations.
pub type Result<T> = std::result::Result<T, UserbaseError>;
