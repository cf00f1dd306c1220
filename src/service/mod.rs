pub mod movie;
pub mod rating;
pub mod slug;
pub mod validation;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{DbError, ListOptions, Movie, MovieRating};
pub use movie::MovieServiceImpl;
pub use rating::RatingServiceImpl;
pub use validation::ValidationFailure;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0:?}")]
    Validation(Vec<ValidationFailure>),
    #[error(transparent)]
    Database(#[from] DbError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Fail with a validation error unless `failures` is empty.
pub(crate) fn ensure_valid(failures: Vec<ValidationFailure>) -> ServiceResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Validation(failures))
    }
}

#[async_trait]
pub trait MovieService: Send + Sync {
    async fn create(&self, movie: &Movie) -> ServiceResult<()>;
    async fn get_by_id(&self, id: Uuid, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>>;
    async fn get_by_slug(&self, slug: &str, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>>;
    async fn get_all(&self, options: &ListOptions) -> ServiceResult<Vec<Movie>>;
    async fn get_count(&self, title: Option<&str>, year_of_release: Option<i32>) -> ServiceResult<i64>;
    /// Returns `None` when no movie with this id exists.
    async fn update(&self, movie: &Movie, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>>;
    async fn delete_by_id(&self, id: Uuid) -> ServiceResult<bool>;
}

#[async_trait]
pub trait RatingService: Send + Sync {
    /// Returns `false` when the movie does not exist.
    async fn rate_movie(&self, movie_id: Uuid, rating: i32, user_id: Uuid) -> ServiceResult<bool>;
    async fn delete_rating(&self, movie_id: Uuid, user_id: Uuid) -> ServiceResult<bool>;
    async fn get_ratings_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<MovieRating>>;
}
