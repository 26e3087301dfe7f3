//! Profile types for userbase.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::mugshot;
use crate::auth::validation::ValidationError;
use crate::config::{AccountsConfig, MugshotConfig};
use crate::db::User;

/// Maximum length of first and last name.
pub const MAX_NAME_LENGTH: usize = 30;

/// Maximum length of the location field.
pub const MAX_LOCATION_LENGTH: usize = 255;

/// Maximum length of the about text.
pub const MAX_ABOUT_LENGTH: usize = 1000;

/// Who may see a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    /// Everyone, signed in or not.
    Open,
    /// Signed-in users.
    #[default]
    Registered,
    /// Only the owner.
    Closed,
}

impl Privacy {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Open => "open",
            Privacy::Registered => "registered",
            Privacy::Closed => "closed",
        }
    }

    /// Parse from the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Privacy::Open),
            "registered" => Some(Privacy::Registered),
            "closed" => Some(Privacy::Closed),
            _ => None,
        }
    }

    /// Levels that show up in the profile list for a viewer.
    pub fn listable_for(signed_in: bool) -> &'static [Privacy] {
        if signed_in {
            &[Privacy::Open, Privacy::Registered]
        } else {
            &[Privacy::Open]
        }
    }
}

/// Gender shown on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
}

impl Gender {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Parse from the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Profile row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Owning user.
    pub user_id: i64,
    /// Uploaded mugshot URL.
    pub mugshot: Option<String>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Birth date.
    pub birth_date: Option<NaiveDate>,
    /// Personal website.
    pub website: String,
    /// Free-form location.
    pub location: String,
    /// About text.
    pub about: String,
    /// Visibility.
    pub privacy: Privacy,
    /// Preferred language code.
    pub language: String,
}

impl Profile {
    /// Age in whole years on `today`.
    pub fn age(&self, today: NaiveDate) -> Option<u32> {
        let born = self.birth_date?;
        if born > today {
            return None;
        }
        let mut years = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// Capability every displayable profile offers.
pub trait PublicProfile {
    /// Visibility level.
    fn privacy(&self) -> Privacy;

    /// Name to show: "first last" when set, otherwise the username.
    fn display_name(&self) -> String;

    /// Image URL to show, if any.
    fn mugshot_url(&self, settings: &MugshotConfig) -> Option<String>;
}

/// A user together with their profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// The user record.
    pub user: User,
    /// The profile.
    pub profile: Profile,
}

impl PublicProfile for UserProfile {
    fn privacy(&self) -> Privacy {
        self.profile.privacy
    }

    fn display_name(&self) -> String {
        self.user.full_name_or_username()
    }

    fn mugshot_url(&self, settings: &MugshotConfig) -> Option<String> {
        mugshot::mugshot_url(self.profile.mugshot.as_deref(), &self.user.email, settings)
    }
}

/// Decide whether `viewer` may see a profile owned by `owner_id`.
///
/// `viewer_has_view_perm` is the viewer's `view_profile` grant on it.
pub fn can_view_profile(
    profile: &impl PublicProfile,
    owner_id: i64,
    viewer: Option<&User>,
    viewer_has_view_perm: bool,
) -> bool {
    if let Some(v) = viewer {
        if v.id == owner_id || (v.is_active && (v.is_staff || viewer_has_view_perm)) {
            return true;
        }
    }
    match profile.privacy() {
        Privacy::Open => true,
        Privacy::Registered => viewer.is_some_and(|v| v.is_active),
        Privacy::Closed => false,
    }
}

/// What a viewer gets to see of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    /// User ID.
    pub user_id: i64,
    /// Username.
    pub username: String,
    /// Display name.
    pub display_name: String,
    /// Email, unless hidden.
    pub email: Option<String>,
    /// Mugshot URL.
    pub mugshot_url: Option<String>,
    /// Gender.
    pub gender: Option<Gender>,
    /// Age in years.
    pub age: Option<u32>,
    /// Website.
    pub website: String,
    /// Location.
    pub location: String,
    /// About text.
    pub about: String,
    /// Visibility.
    pub privacy: Privacy,
    /// Language.
    pub language: String,
    /// Sign-up time.
    pub date_joined: DateTime<Utc>,
}

impl ProfileView {
    /// Build the view of `profile` for a viewer.
    pub fn build(
        profile: &UserProfile,
        show_email: bool,
        settings: &MugshotConfig,
        today: NaiveDate,
    ) -> Self {
        let email = (show_email && !profile.user.email.is_empty()).then(|| profile.user.email.clone());
        Self {
            user_id: profile.user.id,
            username: profile.user.username.clone(),
            display_name: profile.display_name(),
            email,
            mugshot_url: profile.mugshot_url(settings),
            gender: profile.profile.gender,
            age: profile.profile.age(today),
            website: profile.profile.website.clone(),
            location: profile.profile.location.clone(),
            about: profile.profile.about.clone(),
            privacy: profile.profile.privacy,
            language: profile.profile.language.clone(),
            date_joined: profile.user.date_joined,
        }
    }
}

/// Profile edit request. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New first name.
    pub first_name: Option<String>,
    /// New last name.
    pub last_name: Option<String>,
    /// New mugshot URL (`Some(None)` clears it).
    pub mugshot: Option<Option<String>>,
    /// New gender (`Some(None)` clears it).
    pub gender: Option<Option<Gender>>,
    /// New birth date (`Some(None)` clears it).
    pub birth_date: Option<Option<NaiveDate>>,
    /// New website.
    pub website: Option<String>,
    /// New location.
    pub location: Option<String>,
    /// New about text.
    pub about: Option<String>,
    /// New privacy level.
    pub privacy: Option<Privacy>,
    /// New language.
    pub language: Option<String>,
}

impl ProfileUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set first and last name.
    pub fn name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Set or clear the mugshot.
    pub fn mugshot(mut self, url: Option<String>) -> Self {
        self.mugshot = Some(url);
        self
    }

    /// Set or clear the gender.
    pub fn gender(mut self, gender: Option<Gender>) -> Self {
        self.gender = Some(gender);
        self
    }

    /// Set or clear the birth date.
    pub fn birth_date(mut self, date: Option<NaiveDate>) -> Self {
        self.birth_date = Some(date);
        self
    }

    /// Set the website.
    pub fn website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    /// Set the location.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the about text.
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Set the privacy level.
    pub fn privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = Some(privacy);
        self
    }

    /// Set the language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Whether any profile column changes.
    pub fn touches_profile(&self) -> bool {
        self.mugshot.is_some()
            || self.gender.is_some()
            || self.birth_date.is_some()
            || self.website.is_some()
            || self.location.is_some()
            || self.about.is_some()
            || self.privacy.is_some()
            || self.language.is_some()
    }

    /// Whether any user column changes.
    pub fn touches_user(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some()
    }

    /// Check every set field.
    pub fn validate(&self, settings: &AccountsConfig, today: NaiveDate) -> Result<(), ValidationError> {
        for name in [&self.first_name, &self.last_name].into_iter().flatten() {
            if name.chars().count() > MAX_NAME_LENGTH {
                return Err(ValidationError::NameTooLong(MAX_NAME_LENGTH));
            }
        }
        if let Some(Some(url)) = &self.mugshot {
            if !is_http_url(url) {
                return Err(ValidationError::MugshotInvalid);
            }
        }
        if let Some(Some(date)) = self.birth_date {
            if date > today {
                return Err(ValidationError::BirthDateInFuture);
            }
        }
        if let Some(website) = &self.website {
            if !website.trim().is_empty() && !is_http_url(website.trim()) {
                return Err(ValidationError::WebsiteInvalid);
            }
        }
        if let Some(location) = &self.location {
            if location.chars().count() > MAX_LOCATION_LENGTH {
                return Err(ValidationError::LocationTooLong(MAX_LOCATION_LENGTH));
            }
        }
        if let Some(about) = &self.about {
            let has_control = about
                .chars()
                .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'));
            if has_control || about.chars().count() > MAX_ABOUT_LENGTH {
                return Err(ValidationError::AboutInvalid(MAX_ABOUT_LENGTH));
            }
        }
        if let Some(language) = &self.language {
            if !settings.languages.iter().any(|l| l == language) {
                return Err(ValidationError::LanguageUnsupported(language.clone()));
            }
        }
        Ok(())
    }
}

fn is_http_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
        .unwrap_or(false)
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Page number, starting at 1.
    pub page: u32,
    /// Page size.
    pub per_page: u32,
    /// Items across all pages.
    pub total: i64,
}

impl<T> Page<T> {
    /// Number of pages.
    pub fn num_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        let pages = (self.total.max(0) as u64).div_ceil(self.per_page as u64);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}
