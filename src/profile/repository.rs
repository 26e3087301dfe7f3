//! Profile repository for userbase.

use chrono::NaiveDate;
use sqlx::QueryBuilder;

use super::types::{Gender, Privacy, Profile, ProfileUpdate};
use crate::db::{DbBackend, DbConnection};
use crate::{Result, UserbaseError};

const PROFILE_COLUMNS: &str =
    "user_id, mugshot, gender, birth_date, website, location, about, privacy, language";

/// Raw profile row before enum columns are parsed.
#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: i64,
    mugshot: Option<String>,
    gender: Option<String>,
    birth_date: Option<NaiveDate>,
    website: String,
    location: String,
    about: String,
    privacy: String,
    language: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = UserbaseError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        let privacy = Privacy::parse(&row.privacy).ok_or_else(|| {
            UserbaseError::Database(format!("unknown privacy level '{}'", row.privacy))
        })?;
        let gender = match row.gender.as_deref() {
            None | Some("") => None,
            Some(g) => Some(
                Gender::parse(g)
                    .ok_or_else(|| UserbaseError::Database(format!("unknown gender '{g}'")))?,
            ),
        };
        Ok(Profile {
            user_id: row.user_id,
            mugshot: row.mugshot,
            gender,
            birth_date: row.birth_date,
            website: row.website,
            location: row.location,
            about: row.about,
            privacy,
            language: row.language,
        })
    }
}

/// Repository for profile rows.
pub struct ProfileRepository<'c> {
    conn: &'c mut DbConnection,
}

impl<'c> ProfileRepository<'c> {
    /// Create a new repository on the given connection.
    pub fn new(conn: &'c mut DbConnection) -> Self {
        Self { conn }
    }

    /// Create an empty profile.
    pub async fn create(&mut self, user_id: i64, privacy: Privacy, language: &str) -> Result<Profile> {
        sqlx::query("INSERT INTO profiles (user_id, privacy, language) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(privacy.as_str())
            .bind(language)
            .execute(&mut *self.conn)
            .await?;

        self.get_by_user_id(user_id)
            .await?
            .ok_or_else(|| UserbaseError::NotFound("profile".to_string()))
    }

    /// Get the profile of a user.
    pub async fn get_by_user_id(&mut self, user_id: i64) -> Result<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(Profile::try_from).transpose()
    }

    /// Apply the profile fields of `update`.
    pub async fn update(&mut self, user_id: i64, update: &ProfileUpdate) -> Result<Option<Profile>> {
        if !update.touches_profile() {
            return self.get_by_user_id(user_id).await;
        }

        let mut query: QueryBuilder<DbBackend> = QueryBuilder::new("UPDATE profiles SET ");
        let mut separated = query.separated(", ");

        if let Some(ref mugshot) = update.mugshot {
            separated.push("mugshot = ");
            separated.push_bind_unseparated(mugshot.clone());
        }
        if let Some(gender) = update.gender {
            separated.push("gender = ");
            separated.push_bind_unseparated(gender.map(|g| g.as_str().to_string()));
        }
        if let Some(birth_date) = update.birth_date {
            separated.push("birth_date = ");
            separated.push_bind_unseparated(birth_date);
        }
        if let Some(ref website) = update.website {
            separated.push("website = ");
            separated.push_bind_unseparated(website.trim().to_string());
        }
        if let Some(ref location) = update.location {
            separated.push("location = ");
            separated.push_bind_unseparated(location.trim().to_string());
        }
        if let Some(ref about) = update.about {
            separated.push("about = ");
            separated.push_bind_unseparated(about.clone());
        }
        if let Some(privacy) = update.privacy {
            separated.push("privacy = ");
            separated.push_bind_unseparated(privacy.as_str());
        }
        if let Some(ref language) = update.language {
            separated.push("language = ");
            separated.push_bind_unseparated(language.clone());
        }

        query.push(" WHERE user_id = ");
        query.push_bind(user_id);

        let result = query.build().execute(&mut *self.conn).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_user_id(user_id).await
    }

    /// Profiles for a listing, ordered by username.
    ///
    /// With `privacy` set only those levels are returned; `active_only`
    /// skips users that cannot sign in.
    pub async fn list(
        &mut self,
        privacy: Option<&[Privacy]>,
        active_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Profile>> {
        let mut query: QueryBuilder<DbBackend> = QueryBuilder::new(
            "SELECT p.user_id, p.mugshot, p.gender, p.birth_date, p.website, p.location,
                    p.about, p.privacy, p.language
             FROM profiles p JOIN users u ON u.id = p.user_id WHERE 1 = 1",
        );
        push_filters(&mut query, privacy, active_only);
        query.push(" ORDER BY u.username LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows = query
            .build_query_as::<ProfileRow>()
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(Profile::try_from).collect()
    }

    /// Count the profiles [`list`](Self::list) would return without paging.
    pub async fn count(&mut self, privacy: Option<&[Privacy]>, active_only: bool) -> Result<i64> {
        let mut query: QueryBuilder<DbBackend> = QueryBuilder::new(
            "SELECT COUNT(*) FROM profiles p JOIN users u ON u.id = p.user_id WHERE 1 = 1",
        );
        push_filters(&mut query, privacy, active_only);
        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, DbBackend>, privacy: Option<&[Privacy]>, active_only: bool) {
    if active_only {
        query.push(" AND u.is_active = ");
        query.push_bind(true);
    }
    if let Some(levels) = privacy {
        if levels.is_empty() {
            query.push(" AND 1 = 0");
            return;
        }
        query.push(" AND p.privacy IN (");
        let mut separated = query.separated(", ");
        for level in levels {
            separated.push_bind(level.as_str());
        }
        separated.push_unseparated(")");
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository, UserUpdate};
    use crate::Database;
    use chrono::Utc;

    async fn add_user(db: &Database, username: &str, privacy: Privacy) -> i64 {
        let mut conn = db.acquire().await.unwrap();
        let user = UserRepository::new(&mut conn)
            .create(&NewUser::new(
                username,
                format!("{username}@example.com"),
                "hash",
                Utc::now(),
            ))
            .await
            .unwrap();
        ProfileRepository::new(&mut conn)
            .create(user.id, privacy, "en")
            .await
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let id = add_user(&db, "alice", Privacy::Registered).await;

        let mut conn = db.acquire().await.unwrap();
        let profile = ProfileRepository::new(&mut conn)
            .get_by_user_id(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.privacy, Privacy::Registered);
        assert_eq!(profile.language, "en");
        assert!(profile.gender.is_none());
        assert!(profile.website.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_clear() {
        let db = Database::open_in_memory().await.unwrap();
        let id = add_user(&db, "alice", Privacy::Registered).await;
        let mut conn = db.acquire().await.unwrap();
        let mut repo = ProfileRepository::new(&mut conn);

        let birth = NaiveDate::from_ymd_opt(1990, 5, 17);
        let profile = repo
            .update(
                id,
                &ProfileUpdate::new()
                    .gender(Some(Gender::Female))
                    .birth_date(birth)
                    .website(" https://alice.example.com ")
                    .privacy(Privacy::Open),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.birth_date, birth);
        assert_eq!(profile.website, "https://alice.example.com");
        assert_eq!(profile.privacy, Privacy::Open);

        let profile = repo
            .update(id, &ProfileUpdate::new().gender(None).birth_date(None))
            .await
            .unwrap()
            .unwrap();
        assert!(profile.gender.is_none());
        assert!(profile.birth_date.is_none());
        assert_eq!(profile.privacy, Privacy::Open);

        assert!(repo
            .update(999, &ProfileUpdate::new().about("x"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = Database::open_in_memory().await.unwrap();
        add_user(&db, "carol", Privacy::Closed).await;
        add_user(&db, "alice", Privacy::Open).await;
        add_user(&db, "bob", Privacy::Registered).await;
        let dave = add_user(&db, "dave", Privacy::Open).await;

        let mut conn = db.acquire().await.unwrap();
        UserRepository::new(&mut conn)
            .update(dave, &UserUpdate::new().is_active(false))
            .await
            .unwrap();
        let mut repo = ProfileRepository::new(&mut conn);

        let everyone = repo.list(None, false, 10, 0).await.unwrap();
        assert_eq!(everyone.len(), 4);

        let open_active = repo
            .list(Some(&[Privacy::Open][..]), true, 10, 0)
            .await
            .unwrap();
        assert_eq!(open_active.len(), 1);

        let members = Privacy::listable_for(true);
        assert_eq!(repo.count(Some(members), true).await.unwrap(), 2);

        let page2 = repo.list(Some(members), true, 1, 1).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].privacy, Privacy::Registered);

        assert_eq!(repo.count(Some(&[][..]), false).await.unwrap(), 0);
    }
}
