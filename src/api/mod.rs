pub mod auth;
pub mod error;
pub mod movies;
pub mod ratings;
pub mod types;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::{delete, get, post, put},
    Router,
};
use tracing::error;

use crate::server::AppState;
use auth::{require_admin, require_authenticated, require_trusted_member};

pub const API_V1: &str = "/api/v1";
pub const MOVIES_PATH: &str = "/api/v1/movies";

/// Versioned API routes. Each mutation route carries its own policy guard,
/// applied after the router-wide `auth_middleware` has resolved the caller.
pub fn build_api_router() -> Router<AppState> {
    let movies = get(movies::get_all_movies)
        .merge(post(movies::create_movie).route_layer(from_fn(require_trusted_member)));

    let movie = get(movies::get_movie)
        .merge(put(movies::update_movie).route_layer(from_fn(require_trusted_member)))
        .merge(delete(movies::delete_movie).route_layer(from_fn(require_admin)));

    let movie_ratings = put(ratings::rate_movie)
        .delete(ratings::delete_rating)
        .route_layer(from_fn(require_authenticated));

    let my_ratings = get(ratings::get_user_ratings).route_layer(from_fn(require_authenticated));

    Router::new()
        .route(MOVIES_PATH, movies)
        .route(&format!("{}/:id", MOVIES_PATH), movie)
        .route(&format!("{}/:id/ratings", MOVIES_PATH), movie_ratings)
        .route(&format!("{}/ratings/me", API_V1), my_ratings)
        .route(&format!("{}/auth/token", API_V1), post(auth::login))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "Healthy"),
        Err(e) => {
            error!("health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
        }
    }
}
