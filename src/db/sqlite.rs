use std::collections::HashMap;
use std::fmt::Write;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::model::*;
use super::repo::*;

const MOVIE_COLUMNS: &str = "SELECT m.id, m.slug, m.title, m.yearofrelease,
    (SELECT AVG(r.rating) FROM ratings r WHERE r.movieid = m.id) AS rating,
    (SELECT r.rating FROM ratings r WHERE r.movieid = m.id AND r.userid = ?) AS userrating
    FROM movies m";

const TOKEN_PURGE_INTERVAL_SECS: u64 = 600;

pub struct SqliteRepository {
    pool: SqlitePool,
    token_cache: Arc<RwLock<HashMap<String, AccessToken>>>,
}

impl SqliteRepository {
    pub async fn new(db_path: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(db_path)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty
        // database, so the pool must hold on to exactly one.
        let pool = if db_path.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let repo = Self {
            pool,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        };

        repo.init_schema().await?;

        info!("Database initialized at {}", db_path);

        Ok(repo)
    }

    async fn init_schema(&self) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub fn start_background_tasks(self: Arc<Self>) {
        let repo = Arc::clone(&self);
        tokio::spawn(async move {
            repo.token_purge_loop().await;
        });
    }

    async fn token_purge_loop(&self) {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(TOKEN_PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match self.purge_expired_tokens(Utc::now()).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "purged expired access tokens"),
                Err(e) => error!("Failed to purge expired access tokens: {}", e),
            }
        }
    }

    /// Remove tokens that expired at or before `now` from both the cache
    /// and the table. Returns the number of rows deleted.
    pub async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> DbResult<usize> {
        self.token_cache
            .write()
            .await
            .retain(|_, token| !token.is_expired(now));

        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT token, expires FROM accesstokens WHERE expires IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut purged = 0;
        for (token, expires) in rows {
            if parse_timestamp(expires).is_some_and(|expires| expires <= now) {
                sqlx::query("DELETE FROM accesstokens WHERE token = ?")
                    .bind(&token)
                    .execute(&self.pool)
                    .await?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_genres(&self, movie_id: &str) -> DbResult<Vec<String>> {
        let results = sqlx::query_as::<_, (String,)>(
            "SELECT name FROM genres WHERE movieid = ? ORDER BY position",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results.into_iter().map(|r| r.0).collect())
    }

    async fn row_to_movie(&self, row: MovieRow) -> DbResult<Movie> {
        let genres = self.get_genres(&row.id).await?;
        row.into_movie(genres)
    }

    async fn insert_genres(
        tx: &mut Transaction<'_, Sqlite>,
        movie_id: &str,
        genres: &[String],
    ) -> DbResult<()> {
        for (position, genre) in genres.iter().enumerate() {
            sqlx::query("INSERT INTO genres (movieid, position, name) VALUES (?, ?, ?)")
                .bind(movie_id)
                .bind(position as i64)
                .bind(genre)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

fn sort_column(field: &str) -> Option<&'static str> {
    match field.to_ascii_lowercase().as_str() {
        "title" => Some("m.title"),
        "yearofrelease" => Some("m.yearofrelease"),
        _ => None,
    }
}

fn parse_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[async_trait]
impl MovieRepo for SqliteRepository {
    async fn create_movie(&self, movie: &Movie) -> DbResult<()> {
        let id = movie.id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO movies (id, slug, title, yearofrelease) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(movie.slug())
            .bind(&movie.title)
            .bind(movie.year_of_release)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    DbError::AlreadyExists(format!("Movie already exists: {}", movie.slug()))
                }
                _ => DbError::Sqlx(e),
            })?;

        Self::insert_genres(&mut tx, &id, &movie.genres).await?;
        tx.commit().await?;

        debug!(movie_id = %id, "inserted movie");
        Ok(())
    }

    async fn get_movie_by_id(&self, id: Uuid, user_id: Option<Uuid>) -> DbResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!("{} WHERE m.id = ?", MOVIE_COLUMNS))
            .bind(user_id.map(|u| u.to_string()))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_movie(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_movie_by_slug(&self, slug: &str, user_id: Option<Uuid>) -> DbResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!("{} WHERE m.slug = ?", MOVIE_COLUMNS))
            .bind(user_id.map(|u| u.to_string()))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_movie(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_movies(&self, options: &ListOptions) -> DbResult<Vec<Movie>> {
        let mut query = format!(
            "{} WHERE (? IS NULL OR m.title LIKE ('%' || ? || '%'))
            AND (? IS NULL OR m.yearofrelease = ?)",
            MOVIE_COLUMNS
        );
        if let Some(column) = options.sort_field.as_deref().and_then(sort_column) {
            let direction = match options.sort_order {
                SortOrder::Descending => "DESC",
                _ => "ASC",
            };
            let _ = write!(&mut query, " ORDER BY {} {}", column, direction);
        }
        query.push_str(" LIMIT ? OFFSET ?");

        let rows = sqlx::query_as::<_, MovieRow>(&query)
            .bind(options.user_id.map(|u| u.to_string()))
            .bind(options.title.as_deref())
            .bind(options.title.as_deref())
            .bind(options.year_of_release)
            .bind(options.year_of_release)
            .bind(i64::from(options.page_size))
            .bind(options.offset())
            .fetch_all(&self.pool)
            .await?;

        let mut movies = Vec::with_capacity(rows.len());
        for row in rows {
            movies.push(self.row_to_movie(row).await?);
        }
        Ok(movies)
    }

    async fn count_movies(&self, title: Option<&str>, year_of_release: Option<i32>) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM movies m
            WHERE (? IS NULL OR m.title LIKE ('%' || ? || '%'))
            AND (? IS NULL OR m.yearofrelease = ?)",
        )
        .bind(title)
        .bind(title)
        .bind(year_of_release)
        .bind(year_of_release)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn update_movie(&self, movie: &Movie) -> DbResult<()> {
        let id = movie.id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM genres WHERE movieid = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        Self::insert_genres(&mut tx, &id, &movie.genres).await?;

        let result = sqlx::query("UPDATE movies SET slug = ?, title = ?, yearofrelease = ? WHERE id = ?")
            .bind(movie.slug())
            .bind(&movie.title)
            .bind(movie.year_of_release)
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    DbError::AlreadyExists(format!("Movie already exists: {}", movie.slug()))
                }
                _ => DbError::Sqlx(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Movie not found: {}", id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_movie(&self, id: Uuid) -> DbResult<bool> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ratings WHERE movieid = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM genres WHERE movieid = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn movie_exists(&self, id: Uuid) -> DbResult<bool> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM movies WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl RatingRepo for SqliteRepository {
    async fn upsert_rating(&self, movie_id: Uuid, user_id: Uuid, rating: i32) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO ratings (userid, movieid, rating) VALUES (?, ?, ?)
            ON CONFLICT (userid, movieid) DO UPDATE SET rating = excluded.rating",
        )
        .bind(user_id.to_string())
        .bind(movie_id.to_string())
        .bind(rating)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("Movie not found: {}", movie_id))
            }
            _ => DbError::Sqlx(e),
        })?;
        Ok(())
    }

    async fn delete_rating(&self, movie_id: Uuid, user_id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM ratings WHERE movieid = ? AND userid = ?")
            .bind(movie_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ratings_by_user(&self, user_id: Uuid) -> DbResult<Vec<MovieRating>> {
        let results = sqlx::query_as::<_, (String, String, i32)>(
            "SELECT r.movieid, m.slug, r.rating FROM ratings r
             INNER JOIN movies m ON m.id = r.movieid
             WHERE r.userid = ?
             ORDER BY m.slug",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        results
            .into_iter()
            .map(|r| {
                Ok(MovieRating {
                    movie_id: parse_uuid(&r.0)?,
                    slug: r.1,
                    rating: r.2,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserRepo for SqliteRepository {
    async fn get_user(&self, username: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password, admin, trustedmember, created FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("User not found: {}", username)),
            _ => DbError::Sqlx(e),
        })
    }

    async fn get_user_by_id(&self, id: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password, admin, trustedmember, created FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("User not found: {}", id)),
            _ => DbError::Sqlx(e),
        })
    }

    async fn upsert_user(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, password, admin, trustedmember, created)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (username) DO UPDATE SET
                password = excluded.password,
                admin = excluded.admin,
                trustedmember = excluded.trustedmember",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.admin)
        .bind(user.trustedmember)
        .bind(&user.created)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccessTokenRepo for SqliteRepository {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken> {
        {
            let cache = self.token_cache.read().await;
            if let Some(t) = cache.get(token) {
                return Ok(t.clone());
            }
        }

        let result = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT token, userid, created, expires FROM accesstokens WHERE token = ?",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound("Token not found".to_string()),
            _ => DbError::Sqlx(e),
        })?;

        let access_token = AccessToken {
            token: result.0,
            userid: result.1,
            created: parse_timestamp(result.2),
            expires: parse_timestamp(result.3),
        };

        let mut cache = self.token_cache.write().await;
        cache.insert(token.to_string(), access_token.clone());

        Ok(access_token)
    }

    async fn upsert_token(&self, token: &AccessToken) -> DbResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO accesstokens (token, userid, created, expires) VALUES (?, ?, ?, ?)",
        )
        .bind(&token.token)
        .bind(&token.userid)
        .bind(token.created.as_ref().map(|dt| dt.to_rfc3339()))
        .bind(token.expires.as_ref().map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        let mut cache = self.token_cache.write().await;
        cache.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn delete_token(&self, token: &str) -> DbResult<()> {
        {
            let mut cache = self.token_cache.write().await;
            cache.remove(token);
        }

        sqlx::query("DELETE FROM accesstokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new("sqlite::memory:").await.unwrap()
    }

    fn movie(title: &str, year: i32) -> Movie {
        Movie {
            id: Uuid::new_v4(),
            title: title.to_string(),
            year_of_release: year,
            genres: vec!["Drama".to_string(), "Action".to_string()],
            rating: None,
            user_rating: None,
        }
    }

    #[test]
    fn test_sort_column() {
        assert_eq!(sort_column("Title"), Some("m.title"));
        assert_eq!(sort_column("yearofrelease"), Some("m.yearofrelease"));
        assert_eq!(sort_column("id; DROP TABLE movies"), None);
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let repo = repo().await;
        let m = movie("Heat", 1995);
        repo.create_movie(&m).await.unwrap();

        let by_id = repo.get_movie_by_id(m.id, None).await.unwrap().unwrap();
        assert_eq!(by_id.title, "Heat");
        assert_eq!(by_id.genres, vec!["Drama", "Action"]);
        let by_slug = repo.get_movie_by_slug("heat-1995", None).await.unwrap().unwrap();
        assert_eq!(by_id, by_slug);

        let dup = movie("Heat", 1995);
        assert!(matches!(
            repo.create_movie(&dup).await,
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_ratings_average_and_upsert() {
        let repo = repo().await;
        let m = movie("Alien", 1979);
        repo.create_movie(&m).await.unwrap();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        repo.upsert_rating(m.id, alice, 2).await.unwrap();
        repo.upsert_rating(m.id, alice, 4).await.unwrap();
        repo.upsert_rating(m.id, bob, 5).await.unwrap();

        let seen_by_alice = repo.get_movie_by_id(m.id, Some(alice)).await.unwrap().unwrap();
        assert_eq!(seen_by_alice.user_rating, Some(4));
        assert_eq!(seen_by_alice.rating, Some(4.5));

        let ratings = repo.list_ratings_by_user(alice).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].rating, 4);
        assert_eq!(ratings[0].slug, "alien-1979");

        assert!(repo.delete_rating(m.id, alice).await.unwrap());
        assert!(!repo.delete_rating(m.id, alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_rating_a_missing_movie_is_not_found() {
        let repo = repo().await;
        assert!(matches!(
            repo.upsert_rating(Uuid::new_v4(), Uuid::new_v4(), 3).await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filter_sort_and_count() {
        let repo = repo().await;
        for (title, year) in [("Rocky", 1976), ("Rocky II", 1979), ("Jaws", 1975)] {
            repo.create_movie(&movie(title, year)).await.unwrap();
        }

        let options = ListOptions {
            title: Some("rocky".to_string()),
            sort_field: Some("yearofrelease".to_string()),
            sort_order: SortOrder::Descending,
            ..ListOptions::default()
        };
        let movies = repo.list_movies(&options).await.unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Rocky II", "Rocky"]);
        assert_eq!(repo.count_movies(Some("rocky"), None).await.unwrap(), 2);
        assert_eq!(repo.count_movies(None, Some(1975)).await.unwrap(), 1);
        assert_eq!(repo.count_movies(None, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_movie() {
        let repo = repo().await;
        let m = movie("Gattaca", 1997);
        repo.create_movie(&m).await.unwrap();
        repo.upsert_rating(m.id, Uuid::new_v4(), 3).await.unwrap();

        assert!(repo.delete_movie(m.id).await.unwrap());
        assert!(!repo.delete_movie(m.id).await.unwrap());
        assert!(!repo.movie_exists(m.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_roundtrip_through_cache() {
        let repo = repo().await;
        let token = AccessToken {
            token: "abc".to_string(),
            userid: Uuid::new_v4().to_string(),
            created: Some(Utc::now()),
            expires: None,
        };
        repo.upsert_token(&token).await.unwrap();
        assert_eq!(repo.get_token("abc").await.unwrap().userid, token.userid);
        repo.delete_token("abc").await.unwrap();
        assert!(matches!(repo.get_token("abc").await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let repo = repo().await;
        let now = Utc::now();
        let token = |name: &str, expires: Option<DateTime<Utc>>| AccessToken {
            token: name.to_string(),
            userid: Uuid::new_v4().to_string(),
            created: Some(now - chrono::Duration::hours(2)),
            expires,
        };
        repo.upsert_token(&token("stale", Some(now - chrono::Duration::hours(1))))
            .await
            .unwrap();
        repo.upsert_token(&token("fresh", Some(now + chrono::Duration::hours(1))))
            .await
            .unwrap();
        repo.upsert_token(&token("forever", None)).await.unwrap();

        assert_eq!(repo.purge_expired_tokens(now).await.unwrap(), 1);
        assert!(matches!(repo.get_token("stale").await, Err(DbError::NotFound(_))));
        assert!(repo.get_token("fresh").await.is_ok());
        assert!(repo.get_token("forever").await.is_ok());
        assert_eq!(repo.purge_expired_tokens(now).await.unwrap(), 0);
    }
}
