//! Activation and confirmation keys.
//!
//! A key is the SHA1 hex digest of a short random salt followed by a seed
//! (the username for activation, the new address for email confirmation).
//! Once used, an activation key is overwritten with [`ACTIVATED`], which
//! can never pass [`is_key_format`].

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha1::{Digest, Sha1};

/// Written in place of an activation key once it has been used.
pub const ACTIVATED: &str = "ALREADY_ACTIVATED";

/// Length of a key in hex characters.
pub const KEY_LENGTH: usize = 40;

fn sha1_hex(input: &[u8]) -> String {
    hex::encode(Sha1::digest(input))
}

/// Five hex characters of fresh randomness.
pub fn random_salt() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill_bytes(&mut bytes);
    let mut salt = sha1_hex(&bytes);
    salt.truncate(5);
    salt
}

/// Generate a new key for `seed`.
///
/// # Examples
///
/// ```
/// use userbase::auth::token::{generate_key, is_key_format};
///
/// let key = generate_key("alice");
/// assert!(is_key_format(&key));
/// assert_ne!(key, generate_key("alice"));
/// ```
pub fn generate_key(seed: &str) -> String {
    let salt = random_salt();
    sha1_hex(format!("{salt}{seed}").as_bytes())
}

/// Whether `key` looks like a key this module generated: exactly 40
/// lowercase hex characters.
pub fn is_key_format(key: &str) -> bool {
    key.len() == KEY_LENGTH && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// When a key created at `created` stops being valid.
pub fn expires_at(created: DateTime<Utc>, valid_days: i64) -> DateTime<Utc> {
    created + Duration::days(valid_days)
}

/// Whether a key created at `created` has expired at `now`.
///
/// A key is still valid at exactly `valid_days` after creation.
pub fn is_expired(created: DateTime<Utc>, valid_days: i64, now: DateTime<Utc>) -> bool {
    now > expires_at(created, valid_days)
}
