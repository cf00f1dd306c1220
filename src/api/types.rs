use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiError;
use crate::db::{ListOptions, Movie, MovieRating, SortOrder};
use crate::service::ValidationFailure;
use crate::util::QueryParams;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovieRequest {
    pub title: String,
    pub year_of_release: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CreateMovieRequest {
    pub fn into_movie(self) -> Movie {
        Movie {
            id: Uuid::new_v4(),
            title: self.title,
            year_of_release: self.year_of_release,
            genres: self.genres,
            rating: None,
            user_rating: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMovieRequest {
    pub title: String,
    pub year_of_release: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl UpdateMovieRequest {
    pub fn into_movie(self, id: Uuid) -> Movie {
        Movie {
            id,
            title: self.title,
            year_of_release: self.year_of_release,
            genres: self.genres,
            rating: None,
            user_rating: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateMovieRequest {
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieResponse {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub rating: Option<f32>,
    pub user_rating: Option<i32>,
    pub year_of_release: i32,
    pub genres: Vec<String>,
}

impl From<Movie> for MovieResponse {
    fn from(movie: Movie) -> Self {
        MovieResponse {
            id: movie.id,
            slug: movie.slug(),
            title: movie.title,
            rating: movie.rating,
            user_rating: movie.user_rating,
            year_of_release: movie.year_of_release,
            genres: movie.genres,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoviesResponse {
    pub items: Vec<MovieResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: i64,
    pub has_next_page: bool,
}

impl MoviesResponse {
    pub fn new(movies: Vec<Movie>, page: u32, page_size: u32, total_count: i64) -> Self {
        MoviesResponse {
            items: movies.into_iter().map(MovieResponse::from).collect(),
            page,
            page_size,
            total_count,
            has_next_page: total_count > i64::from(page) * i64::from(page_size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieRatingResponse {
    pub movie_id: Uuid,
    pub slug: String,
    pub rating: i32,
}

impl From<MovieRating> for MovieRatingResponse {
    fn from(rating: MovieRating) -> Self {
        MovieRatingResponse {
            movie_id: rating.movie_id,
            slug: rating.slug,
            rating: rating.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailureResponse {
    pub errors: Vec<ValidationFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Query parameters of the movie listing, bound from a case-insensitive
/// query string.
#[derive(Debug, Clone, PartialEq)]
pub struct GetAllMoviesRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub sort_by: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl GetAllMoviesRequest {
    pub fn from_query(params: &QueryParams) -> Result<Self, Vec<ValidationFailure>> {
        let mut failures = Vec::new();

        let year = params.parse::<i32>("year").unwrap_or_else(|raw| {
            failures.push(not_valid("Year", &raw));
            None
        });
        let page = params.parse::<u32>("page").unwrap_or_else(|raw| {
            failures.push(not_valid("Page", &raw));
            None
        });
        let page_size = params.parse::<u32>("pageSize").unwrap_or_else(|raw| {
            failures.push(not_valid("PageSize", &raw));
            None
        });

        if !failures.is_empty() {
            return Err(failures);
        }

        Ok(GetAllMoviesRequest {
            title: params.get("title").map(str::to_string),
            year,
            sort_by: params.get("sortBy").map(str::to_string),
            page: page.unwrap_or(DEFAULT_PAGE),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }

    pub fn to_options(&self) -> ListOptions {
        let (sort_field, sort_order) = match self.sort_by.as_deref() {
            None => (None, SortOrder::Unsorted),
            Some(s) => {
                let order = if s.starts_with('-') {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                };
                (Some(s.trim_matches(|c: char| c == '+' || c == '-').to_string()), order)
            }
        };

        ListOptions {
            title: self.title.clone(),
            year_of_release: self.year,
            sort_field,
            sort_order,
            page: self.page,
            page_size: self.page_size,
            user_id: None,
        }
    }
}

fn not_valid(property: &str, raw: &str) -> ValidationFailure {
    ValidationFailure::new(property, format!("The value '{}' is not valid.", raw))
}

/// A JSON request body. A body that cannot be bound to `T` is rejected
/// with a 400 validation response naming the offending field.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(vec![ValidationFailure::new(BODY, e.body_text())]))?;
        parse_json_body(&bytes)
            .map(JsonBody)
            .map_err(|failure| ApiError::Validation(vec![failure]))
    }
}

const BODY: &str = "Body";

pub fn parse_json_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ValidationFailure> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut de).map_err(|e| {
        let message = e.inner().to_string();
        ValidationFailure::new(property_name(&e.path().to_string(), &message), message)
    })?;
    de.end()
        .map_err(|e| ValidationFailure::new(BODY, e.to_string()))?;
    Ok(value)
}

/// Property name for a deserialization error at `path`, in the same
/// PascalCase form the validators use. Missing fields are reported
/// against their parent, so the field name is taken from the message.
fn property_name(path: &str, message: &str) -> String {
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next());
    let field = match (path, missing) {
        (".", Some(name)) => name.to_string(),
        (parent, Some(name)) => format!("{}.{}", parent, name),
        (".", None) => return BODY.to_string(),
        (path, None) => path.to_string(),
    };
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => BODY.to_string(),
    }
}
