//! User profiles for userbase.
//!
//! Every user owns exactly one profile, created with the account. Its
//! privacy level decides who may look at it.

mod mugshot;
mod repository;
mod service;
mod types;

pub use mugshot::{gravatar_url, mugshot_url};
pub use repository::ProfileRepository;
pub use service::{ProfileService, DEFAULT_PER_PAGE};
pub use types::{
    can_view_profile, Gender, Page, Privacy, Profile, ProfileUpdate, ProfileView, PublicProfile,
    UserProfile, MAX_ABOUT_LENGTH, MAX_LOCATION_LENGTH, MAX_NAME_LENGTH,
};
