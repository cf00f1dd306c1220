use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::validation::{current_year, validate_list_options, validate_movie, ValidationFailure};
use super::{ensure_valid, MovieService, ServiceError, ServiceResult};
use crate::db::{DbError, ListOptions, Movie, MovieRepo};

pub struct MovieServiceImpl<R: MovieRepo> {
    repo: Arc<R>,
}

impl<R: MovieRepo> MovieServiceImpl<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    async fn check_slug_free(&self, movie: &Movie) -> ServiceResult<()> {
        let slug = movie.slug();
        match self.repo.get_movie_by_slug(&slug, None).await? {
            Some(existing) if existing.id != movie.id => Err(already_exists()),
            _ => Ok(()),
        }
    }
}

fn already_exists() -> ServiceError {
    ServiceError::Validation(vec![ValidationFailure::new(
        "Slug",
        "This movie already exists in the system",
    )])
}

fn map_conflict(e: DbError) -> ServiceError {
    match e {
        DbError::AlreadyExists(_) => already_exists(),
        e => ServiceError::Database(e),
    }
}

#[async_trait]
impl<R: MovieRepo + 'static> MovieService for MovieServiceImpl<R> {
    async fn create(&self, movie: &Movie) -> ServiceResult<()> {
        ensure_valid(validate_movie(movie, current_year()))?;
        self.check_slug_free(movie).await?;

        self.repo.create_movie(movie).await.map_err(map_conflict)?;
        info!(movie_id = %movie.id, slug = %movie.slug(), "movie created");
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>> {
        Ok(self.repo.get_movie_by_id(id, user_id).await?)
    }

    async fn get_by_slug(&self, slug: &str, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>> {
        Ok(self.repo.get_movie_by_slug(slug, user_id).await?)
    }

    async fn get_all(&self, options: &ListOptions) -> ServiceResult<Vec<Movie>> {
        ensure_valid(validate_list_options(options, current_year()))?;
        Ok(self.repo.list_movies(options).await?)
    }

    async fn get_count(&self, title: Option<&str>, year_of_release: Option<i32>) -> ServiceResult<i64> {
        Ok(self.repo.count_movies(title, year_of_release).await?)
    }

    async fn update(&self, movie: &Movie, user_id: Option<Uuid>) -> ServiceResult<Option<Movie>> {
        ensure_valid(validate_movie(movie, current_year()))?;

        if !self.repo.movie_exists(movie.id).await? {
            return Ok(None);
        }
        self.check_slug_free(movie).await?;

        match self.repo.update_movie(movie).await {
            Ok(()) => {}
            // Deleted between the existence check and the write.
            Err(DbError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(map_conflict(e)),
        }
        info!(movie_id = %movie.id, "movie updated");

        Ok(self.repo.get_movie_by_id(movie.id, user_id).await?)
    }

    async fn delete_by_id(&self, id: Uuid) -> ServiceResult<bool> {
        let deleted = self.repo.delete_movie(id).await?;
        if deleted {
            info!(movie_id = %id, "movie deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;

    async fn service() -> MovieServiceImpl<SqliteRepository> {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        MovieServiceImpl::new(Arc::new(repo))
    }

    fn movie(title: &str, year: i32) -> Movie {
        Movie {
            id: Uuid::new_v4(),
            title: title.to_string(),
            year_of_release: year,
            genres: vec!["Sci-Fi".to_string()],
            rating: None,
            user_rating: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_a_validation_error() {
        let service = service().await;
        service.create(&movie("Dune", 2021)).await.unwrap();

        match service.create(&movie("Dune", 2021)).await {
            Err(ServiceError::Validation(failures)) => {
                assert_eq!(failures[0].property_name, "Slug");
                assert_eq!(failures[0].message, "This movie already exists in the system");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_movie_returns_none() {
        let service = service().await;
        let result = service.update(&movie("Ghost", 1990), None).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_own_slug() {
        let service = service().await;
        let mut m = movie("Dune", 2021);
        service.create(&m).await.unwrap();

        m.genres = vec!["Adventure".to_string(), "Sci-Fi".to_string()];
        let updated = service.update(&m, None).await.unwrap().unwrap();
        assert_eq!(updated.genres, vec!["Adventure", "Sci-Fi"]);
        assert_eq!(updated.slug(), "dune-2021");
    }

    #[tokio::test]
    async fn test_get_all_rejects_bad_options() {
        let service = service().await;
        let options = ListOptions {
            page_size: 100,
            ..ListOptions::default()
        };
        assert!(matches!(
            service.get_all(&options).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
