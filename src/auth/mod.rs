//! Authentication module for userbase.
//!
//! This module provides password hashing, activation keys, object
//! permissions and input validation.

mod password;
pub mod permission;
pub mod token;
pub mod validation;

use thiserror::Error;

pub use password::{
    hash_password, validate_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
pub use permission::{PermissionFix, PermissionService};
pub use validation::ValidationError;

/// Sign-in failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown identification or wrong password.
    #[error("invalid username, email or password")]
    InvalidCredentials,

    /// The account exists but has not been activated or was disabled.
    #[error("this account is inactive")]
    Inactive,

    /// Stored hash could not be used.
    #[error("password error: {0}")]
    Password(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "invalid username, email or password"
        );
        assert_eq!(AuthError::Inactive.to_string(), "this account is inactive");
    }
}
