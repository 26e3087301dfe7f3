//! Application wiring.
//!
//! An [`Application`] owns everything the services need: the database,
//! the configuration, the mail transport and the clock. Services borrow it
//! for the duration of a call.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::accounts::AccountService;
use crate::auth::PermissionService;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Database;
use crate::mailer::{self, EmailTransport};
use crate::messages::MessageService;
use crate::profile::ProfileService;
use crate::Result;

/// Shared state behind every service.
#[derive(Clone)]
pub struct Application {
    db: Arc<Database>,
    config: Arc<Config>,
    mailer: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
}

impl Application {
    /// Create an application from already built parts.
    pub fn new(
        db: Arc<Database>,
        config: Arc<Config>,
        mailer: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            config,
            mailer,
            clock,
        }
    }

    /// Open the database, build the configured mail transport and use the
    /// system clock.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.database).await?;
        let mailer = mailer::from_config(&config.mail)?;
        Ok(Self::new(
            Arc::new(db),
            Arc::new(config),
            mailer,
            Arc::new(SystemClock),
        ))
    }

    /// Get the database.
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Get the configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Get the mail transport.
    pub fn mailer(&self) -> &Arc<dyn EmailTransport> {
        &self.mailer
    }

    /// Get the clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time according to the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Account lifecycle operations.
    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(self)
    }

    /// Profile operations.
    pub fn profiles(&self) -> ProfileService<'_> {
        ProfileService::new(self)
    }

    /// Private messaging operations.
    pub fn messages(&self) -> MessageService<'_> {
        MessageService::new(self)
    }

    /// Object permission operations.
    pub fn permissions(&self) -> PermissionService<'_> {
        PermissionService::new(self)
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("site", &self.config.site.domain)
            .finish_non_exhaustive()
    }
}
