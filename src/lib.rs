//! userbase - pluggable user accounts
//!
//! Signup with activation by email, sign-in, password and email changes,
//! profiles with privacy levels and object permissions, and private
//! messaging with inbox, outbox, drafts and trash.

pub mod accounts;
pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mailer;
pub mod messages;
pub mod profile;

pub use accounts::{Account, AccountService, AccountState, ActivationStatus, SignupRequest};
pub use app::Application;
pub use auth::{
    hash_password, validate_password, verify_password, AuthError, PasswordError, PermissionFix,
    PermissionService, ValidationError,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::{Database, NewUser, ObjectRef, User, UserRepository, UserUpdate};
pub use error::{Result, UserbaseError};
pub use mailer::{EmailTransport, MemoryTransport, OutgoingEmail};
pub use messages::{Message, MessageDetail, MessageService};
pub use profile::{Privacy, ProfileService, ProfileUpdate, ProfileView, PublicProfile};
