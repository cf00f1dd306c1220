use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::auth::AuthUser;
use super::error::ApiError;
use super::movies::parse_id;
use super::types::{JsonBody, MovieRatingResponse, RateMovieRequest};
use crate::server::AppState;

pub async fn rate_movie(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<RateMovieRequest>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let rated = state.ratings.rate_movie(id, request.rating, user_id).await?;
    if rated {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn delete_rating(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let deleted = state.ratings.delete_rating(id, user_id).await?;
    if deleted {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn get_user_ratings(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<MovieRatingResponse>>, ApiError> {
    let ratings = state.ratings.get_ratings_for_user(user_id).await?;
    Ok(Json(
        ratings.into_iter().map(MovieRatingResponse::from).collect(),
    ))
}
