//! Movie catalog endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Principal;
use crate::error::{ApiError, JsonBody};
use crate::models::filters::{validate_filters, MOVIE_SORT_SAFELIST};
use crate::models::movie::validate_movie;
use crate::models::permission::{MOVIES_READ, MOVIES_WRITE};
use crate::models::{Filters, Metadata, Movie, Runtime};
use crate::state::AppState;
use crate::store::MovieStore;
use crate::validator::Validator;

/// Header a client may send to make a PATCH conditional on the version it last saw.
pub const EXPECTED_VERSION: &str = "x-expected-version";

/// Registers movie routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/movies", get(list_movies).post(create_movie))
        .route(
            "/v1/movies/{id}",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
}

#[derive(Deserialize, Default)]
struct ListMoviesQuery {
    title: Option<String>,
    genres: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
}

#[derive(Serialize)]
struct MovieEnvelope {
    movie: Movie,
}

#[derive(Serialize)]
struct MoviesEnvelope {
    movies: Vec<Movie>,
    metadata: Metadata,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct CreateMovieInput {
    title: String,
    year: i32,
    runtime: Runtime,
    genres: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct UpdateMovieInput {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    genres: Option<Vec<String>>,
}

/// Parses an optional integer query value, recording a validation error when it is not one.
fn read_int(value: Option<&str>, default: i64, key: &str, v: &mut Validator) -> i64 {
    match value {
        None | Some("") => default,
        Some(s) => match s.parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
    }
}

fn read_csv(value: Option<&str>) -> Vec<String> {
    match value {
        None | Some("") => Vec::new(),
        Some(csv) => csv.split(',').map(str::to_string).collect(),
    }
}

/// Path ids must be positive integers; anything else is simply not found.
fn read_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

async fn list_movies(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<ListMoviesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_permission(&state, MOVIES_READ).await?;

    let mut v = Validator::new();
    let defaults = Filters::default();
    let filters = Filters {
        page: read_int(query.page.as_deref(), defaults.page, "page", &mut v),
        page_size: read_int(
            query.page_size.as_deref(),
            defaults.page_size,
            "page_size",
            &mut v,
        ),
        sort: query
            .sort
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.sort),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };
    let title = query.title.unwrap_or_default();
    let genres = read_csv(query.genres.as_deref());

    validate_filters(&mut v, &filters);
    v.finish().map_err(ApiError::ValidationFailed)?;

    let (movies, metadata) = state
        .store
        .list_movies(state.deadline(), &title, &genres, &filters)
        .await?;

    Ok(Json(MoviesEnvelope { movies, metadata }))
}

async fn create_movie(
    principal: Principal,
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateMovieInput>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_permission(&state, MOVIES_WRITE).await?;

    let movie = Movie::new(input.title, input.year, input.runtime, input.genres);
    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish().map_err(ApiError::ValidationFailed)?;

    let movie = state.store.insert_movie(state.deadline(), &movie).await?;
    info!(movie_id = movie.id, "Created movie.");

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieEnvelope { movie }),
    ))
}

async fn show_movie(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_permission(&state, MOVIES_READ).await?;
    let id = read_id(&id)?;

    let movie = state.store.get_movie(state.deadline(), id).await?;
    Ok(Json(MovieEnvelope { movie }))
}

/// Partial update guarded by the stored version.
///
/// The record is read, patched and written back with the version that was read,
/// so a concurrent writer in between turns this call into an edit conflict.
async fn update_movie(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovieInput>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_permission(&state, MOVIES_WRITE).await?;
    let id = read_id(&id)?;

    let mut movie = state.store.get_movie(state.deadline(), id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION) {
        if expected.as_bytes() != movie.version.to_string().as_bytes() {
            return Err(ApiError::EditConflict);
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish().map_err(ApiError::ValidationFailed)?;

    movie.version = state.store.update_movie(state.deadline(), &movie).await?;
    Ok(Json(MovieEnvelope { movie }))
}

async fn delete_movie(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    principal.require_permission(&state, MOVIES_WRITE).await?;
    let id = read_id(&id)?;

    state.store.delete_movie(state.deadline(), id).await?;
    Ok(Json(
        serde_json::json!({ "message": "movie successfully deleted" }),
    ))
}
