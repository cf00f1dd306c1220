use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::auth::MaybeUser;
use super::error::ApiError;
use super::types::*;
use super::MOVIES_PATH;
use crate::server::AppState;
use crate::util::QueryParams;

const CACHE_CONTROL: &str = "public, max-age=30";
// The listing's query parameters are part of the cache key through the URL.
const VARY: &str = "Accept, Accept-Encoding";

/// Movie ids in mutation routes must be UUIDs; anything else matches no movie.
pub(crate) fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::NotFound)
}

pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateMovieRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movie = request.into_movie();

    state.movies.create(&movie).await?;

    let response = MovieResponse::from(movie);
    let location = format!("{}/{}", MOVIES_PATH, response.id);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(response)))
}

pub async fn get_movie(
    State(state): State<AppState>,
    MaybeUser(user_id): MaybeUser,
    Path(id_or_slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let movie = match Uuid::parse_str(&id_or_slug) {
        Ok(id) => state.movies.get_by_id(id, user_id).await?,
        Err(_) => state.movies.get_by_slug(&id_or_slug, user_id).await?,
    };

    let movie = movie.ok_or(ApiError::NotFound)?;

    Ok((
        [(header::CACHE_CONTROL, CACHE_CONTROL), (header::VARY, VARY)],
        Json(MovieResponse::from(movie)),
    ))
}

pub async fn get_all_movies(
    State(state): State<AppState>,
    MaybeUser(user_id): MaybeUser,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let request = GetAllMoviesRequest::from_query(&params).map_err(ApiError::Validation)?;
    let options = request.to_options().with_user(user_id);

    let movies = state.movies.get_all(&options).await?;
    let movie_count = state
        .movies
        .get_count(options.title.as_deref(), options.year_of_release)
        .await?;

    let response = MoviesResponse::new(movies, request.page, request.page_size, movie_count);

    Ok((
        [(header::CACHE_CONTROL, CACHE_CONTROL), (header::VARY, VARY)],
        Json(response),
    ))
}

pub async fn update_movie(
    State(state): State<AppState>,
    MaybeUser(user_id): MaybeUser,
    Path(id): Path<String>,
    JsonBody(request): JsonBody<UpdateMovieRequest>,
) -> Result<Json<MovieResponse>, ApiError> {
    let id = parse_id(&id)?;
    let movie = request.into_movie(id);

    let updated = state
        .movies
        .update(&movie, user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MovieResponse::from(updated)))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;

    if !state.movies.delete_by_id(id).await? {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::OK)
}
