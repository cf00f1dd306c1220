use async_trait::async_trait;
use uuid::Uuid;

use super::model::*;

#[async_trait]
pub trait MovieRepo: Send + Sync {
    async fn create_movie(&self, movie: &Movie) -> DbResult<()>;
    async fn get_movie_by_id(&self, id: Uuid, user_id: Option<Uuid>) -> DbResult<Option<Movie>>;
    async fn get_movie_by_slug(&self, slug: &str, user_id: Option<Uuid>) -> DbResult<Option<Movie>>;
    async fn list_movies(&self, options: &ListOptions) -> DbResult<Vec<Movie>>;
    async fn count_movies(&self, title: Option<&str>, year_of_release: Option<i32>) -> DbResult<i64>;
    async fn update_movie(&self, movie: &Movie) -> DbResult<()>;
    async fn delete_movie(&self, id: Uuid) -> DbResult<bool>;
    async fn movie_exists(&self, id: Uuid) -> DbResult<bool>;
}

#[async_trait]
pub trait RatingRepo: Send + Sync {
    async fn upsert_rating(&self, movie_id: Uuid, user_id: Uuid, rating: i32) -> DbResult<()>;
    async fn delete_rating(&self, movie_id: Uuid, user_id: Uuid) -> DbResult<bool>;
    async fn list_ratings_by_user(&self, user_id: Uuid) -> DbResult<Vec<MovieRating>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, username: &str) -> DbResult<User>;
    async fn get_user_by_id(&self, id: &str) -> DbResult<User>;
    async fn upsert_user(&self, user: &User) -> DbResult<()>;
}

#[async_trait]
pub trait AccessTokenRepo: Send + Sync {
    async fn get_token(&self, token: &str) -> DbResult<AccessToken>;
    async fn upsert_token(&self, token: &AccessToken) -> DbResult<()>;
    async fn delete_token(&self, token: &str) -> DbResult<()>;
}
