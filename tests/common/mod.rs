//! Test helpers for integration tests.
//!
//! Provides TestApp, a fully wired application on an in-memory database
//! with a captured mailbox and a hand-driven clock.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use userbase::auth::token::is_key_format;
use userbase::{Application, Config, Database, ManualClock, MemoryTransport, User};

/// Password used for every test user.
pub const PASSWORD: &str = "swordfish";

/// Application under test plus handles on its mail and clock.
pub struct TestApp {
    pub app: Application,
    pub mail: Arc<MemoryTransport>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    /// Create a test application with default configuration.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a test application with the given configuration.
    pub async fn with_config(config: Config) -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("in-memory database");
        let mail = Arc::new(MemoryTransport::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let app = Application::new(Arc::new(db), Arc::new(config), mail.clone(), clock.clone());
        Self { app, mail, clock }
    }

    /// Move the clock forward.
    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    /// Key embedded in the link of the last email sent.
    pub fn last_key(&self) -> String {
        let email = self.mail.last().expect("an email was sent");
        key_from_body(&email.body).expect("email contains a key")
    }

    /// Create an active user that can sign in straight away.
    pub async fn active_user(&self, username: &str) -> User {
        self.app
            .accounts()
            .create_user(
                username,
                &format!("{username}@example.com"),
                PASSWORD,
                true,
                false,
            )
            .await
            .expect("create active user")
    }
}

/// Time every test clock starts at.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Create a test configuration.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.site.name = "Example".to_string();
    config.site.domain = "example.com".to_string();
    config
}

/// Pull an activation or confirmation key out of an email body.
pub fn key_from_body(body: &str) -> Option<String> {
    body.split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| is_key_format(part))
        .map(str::to_string)
}
