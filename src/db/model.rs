use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::slug::make_slug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Uuid,
    pub title: String,
    pub year_of_release: i32,
    pub genres: Vec<String>,
    /// Average of all user ratings, if any.
    pub rating: Option<f32>,
    /// Rating given by the requesting user.
    pub user_rating: Option<i32>,
}

impl Movie {
    pub fn slug(&self) -> String {
        make_slug(&self.title, self.year_of_release)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovieRow {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub yearofrelease: i32,
    pub rating: Option<f64>,
    pub userrating: Option<i32>,
}

impl MovieRow {
    pub fn into_movie(self, genres: Vec<String>) -> DbResult<Movie> {
        let id = parse_uuid(&self.id)?;
        Ok(Movie {
            id,
            title: self.title,
            year_of_release: self.yearofrelease,
            genres,
            rating: self.rating.map(|r| r as f32),
            user_rating: self.userrating,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRating {
    pub movie_id: Uuid,
    pub slug: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Unsorted,
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub title: Option<String>,
    pub year_of_release: Option<i32>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub page: u32,
    pub page_size: u32,
    pub user_id: Option<Uuid>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            title: None,
            year_of_release: None,
            sort_field: None,
            sort_order: SortOrder::Unsorted,
            page: 1,
            page_size: 10,
            user_id: None,
        }
    }
}

impl ListOptions {
    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page.max(1)) - 1) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub admin: bool,
    pub trustedmember: bool,
    pub created: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub userid: String,
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }
}

pub(crate) fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::InvalidData(format!("bad uuid {}: {}", s, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset() {
        let mut options = ListOptions::default();
        assert_eq!(options.offset(), 0);
        options.page = 2;
        options.page_size = 10;
        assert_eq!(options.offset(), 10);
        options.page = 0;
        assert_eq!(options.offset(), 0);
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = AccessToken {
            token: "t".to_string(),
            userid: "u".to_string(),
            created: Some(now),
            expires: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(token.is_expired(now));
        let forever = AccessToken { expires: None, ..token };
        assert!(!forever.is_expired(now));
    }
}
