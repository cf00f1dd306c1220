use axum::{extract::Request, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::db::SqliteRepository;
use crate::service::{MovieService, MovieServiceImpl, RatingService, RatingServiceImpl};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<SqliteRepository>,
    pub movies: Arc<dyn MovieService>,
    pub ratings: Arc<dyn RatingService>,
}

impl AppState {
    /// State with the SQLite-backed services.
    pub fn new(config: Config, db: Arc<SqliteRepository>) -> Self {
        let movies = Arc::new(MovieServiceImpl::new(db.clone()));
        let ratings = Arc::new(RatingServiceImpl::new(db.clone()));
        Self::with_services(config, db, movies, ratings)
    }

    pub fn with_services(
        config: Config,
        db: Arc<SqliteRepository>,
        movies: Arc<dyn MovieService>,
        ratings: Arc<dyn RatingService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            movies,
            ratings,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_health", get(crate::api::health))
        .merge(crate::api::build_api_router())
        .fallback(fallback_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::api::auth::auth_middleware,
        ))
        .layer(axum::middleware::from_fn(crate::middleware::log_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([axum::http::header::LOCATION]),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_handler(req: Request) -> impl IntoResponse {
    if req.method() == axum::http::Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
