use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::validation::validate_rating;
use super::{ensure_valid, RatingService, ServiceResult};
use crate::db::{DbError, MovieRating, MovieRepo, RatingRepo};

pub struct RatingServiceImpl<R: MovieRepo + RatingRepo> {
    repo: Arc<R>,
}

impl<R: MovieRepo + RatingRepo> RatingServiceImpl<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: MovieRepo + RatingRepo + 'static> RatingService for RatingServiceImpl<R> {
    async fn rate_movie(&self, movie_id: Uuid, rating: i32, user_id: Uuid) -> ServiceResult<bool> {
        ensure_valid(validate_rating(rating))?;

        if !self.repo.movie_exists(movie_id).await? {
            debug!(movie_id = %movie_id, "rating for unknown movie");
            return Ok(false);
        }

        // The movie can still disappear between the check and the write.
        match self.repo.upsert_rating(movie_id, user_id, rating).await {
            Ok(()) => {}
            Err(DbError::NotFound(_)) => {
                debug!(movie_id = %movie_id, "movie deleted while rating");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        info!(movie_id = %movie_id, user_id = %user_id, rating, "movie rated");
        Ok(true)
    }

    async fn delete_rating(&self, movie_id: Uuid, user_id: Uuid) -> ServiceResult<bool> {
        Ok(self.repo.delete_rating(movie_id, user_id).await?)
    }

    async fn get_ratings_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<MovieRating>> {
        Ok(self.repo.list_ratings_by_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbResult, ListOptions, Movie, SqliteRepository};
    use crate::service::ServiceError;

    /// Claims every movie exists, so writes reach the database even after
    /// the movie is gone.
    struct StaleExistence(SqliteRepository);

    #[async_trait]
    impl MovieRepo for StaleExistence {
        async fn create_movie(&self, movie: &Movie) -> DbResult<()> {
            self.0.create_movie(movie).await
        }
        async fn get_movie_by_id(&self, id: Uuid, user_id: Option<Uuid>) -> DbResult<Option<Movie>> {
            self.0.get_movie_by_id(id, user_id).await
        }
        async fn get_movie_by_slug(&self, slug: &str, user_id: Option<Uuid>) -> DbResult<Option<Movie>> {
            self.0.get_movie_by_slug(slug, user_id).await
        }
        async fn list_movies(&self, options: &ListOptions) -> DbResult<Vec<Movie>> {
            self.0.list_movies(options).await
        }
        async fn count_movies(&self, title: Option<&str>, year_of_release: Option<i32>) -> DbResult<i64> {
            self.0.count_movies(title, year_of_release).await
        }
        async fn update_movie(&self, movie: &Movie) -> DbResult<()> {
            self.0.update_movie(movie).await
        }
        async fn delete_movie(&self, id: Uuid) -> DbResult<bool> {
            self.0.delete_movie(id).await
        }
        async fn movie_exists(&self, _id: Uuid) -> DbResult<bool> {
            Ok(true)
        }
    }

    #[async_trait]
    impl RatingRepo for StaleExistence {
        async fn upsert_rating(&self, movie_id: Uuid, user_id: Uuid, rating: i32) -> DbResult<()> {
            self.0.upsert_rating(movie_id, user_id, rating).await
        }
        async fn delete_rating(&self, movie_id: Uuid, user_id: Uuid) -> DbResult<bool> {
            self.0.delete_rating(movie_id, user_id).await
        }
        async fn list_ratings_by_user(&self, user_id: Uuid) -> DbResult<Vec<MovieRating>> {
            self.0.list_ratings_by_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_rate_movie_deleted_after_existence_check() {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        let service = RatingServiceImpl::new(Arc::new(StaleExistence(repo)));
        assert!(!service.rate_movie(Uuid::new_v4(), 3, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_rate_movie() {
        let repo = Arc::new(SqliteRepository::new("sqlite::memory:").await.unwrap());
        let service = RatingServiceImpl::new(repo.clone());
        let user = Uuid::new_v4();

        assert!(!service.rate_movie(Uuid::new_v4(), 3, user).await.unwrap());

        let movie = Movie {
            id: Uuid::new_v4(),
            title: "Up".to_string(),
            year_of_release: 2009,
            genres: vec!["Animation".to_string()],
            rating: None,
            user_rating: None,
        };
        repo.create_movie(&movie).await.unwrap();

        assert!(service.rate_movie(movie.id, 3, user).await.unwrap());
        assert!(service.rate_movie(movie.id, 5, user).await.unwrap());
        let ratings = service.get_ratings_for_user(user).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].rating, 5);

        assert!(matches!(
            service.rate_movie(movie.id, 9, user).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
