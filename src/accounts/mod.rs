//! Account lifecycle for userbase.
//!
//! A new user starts `pending` with a live activation key, becomes
//! `active` when the key is used, or `expired` once the activation window
//! passes, after which the expiry sweep removes it.

pub mod emails;
mod repository;
mod service;
mod types;

pub use repository::AccountRepository;
pub use service::AccountService;
pub use types::{Account, AccountState, ActivationStatus, SignupRequest};
