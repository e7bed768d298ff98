use anyhow::Context;
use hyper::header::{self, HeaderValue};
use hyper::{Request, StatusCode};
use serde_json::json;
use shared::types::filters::validate_filters;
use shared::types::movie::validate_movie;
use shared::types::{Filters, Movie, MovieInput, MoviePatch};
use shared::validator::Validator;
use tracing::info;

use crate::database::movies as db_movies;
use crate::database::users::User;
use crate::error::ApiError;
use crate::handlers::http::routes::HandlerResult;
use crate::handlers::http::utils::{
    QueryParams, RequestBody, deliver_envelope, deliver_serialized_json, read_expected_version,
    read_id_param, read_json,
};
use crate::state::AppState;

/// Values `?sort=` may take; a leading `-` sorts descending.
pub const SORT_SAFE_LIST: [&str; 8] = [
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

fn validate(movie: &Movie) -> Result<(), ApiError> {
    let mut v = Validator::new();
    validate_movie(&mut v, movie);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }
    Ok(())
}

/// GET /v1/movies?title=&genres=&page=&page_size=&sort=
pub async fn handle_list_movies(req: Request<RequestBody>, state: AppState, _user: User) -> HandlerResult {
    let query = QueryParams::from_uri(req.uri());
    let mut v = Validator::new();

    let title = query.read_string("title", "");
    let genres = query.read_csv("genres", &[]);
    let filters = Filters {
        page: query.read_int("page", 1, &mut v),
        page_size: query.read_int("page_size", 20, &mut v),
        sort: query.read_string("sort", "id"),
        sort_safe_list: SORT_SAFE_LIST.iter().map(|s| s.to_string()).collect(),
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let (movies, metadata) = db_movies::get_all(&state.db, &title, &genres, &filters).await?;

    Ok(deliver_serialized_json(
        &json!({ "movies": movies, "metadata": metadata }),
        StatusCode::OK,
    )?)
}

/// POST /v1/movies
pub async fn handle_create_movie(req: Request<RequestBody>, state: AppState, user: User) -> HandlerResult {
    let input: MovieInput = read_json(req).await?;
    let mut movie = Movie::from_input(input);
    validate(&movie)?;

    db_movies::insert(&state.db, &mut movie).await?;
    info!(movie_id = movie.id, user_id = user.id, "Movie created");

    let mut response = deliver_envelope("movie", &movie, StatusCode::CREATED)?;
    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .context("Failed to build Location header")?;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

/// GET /v1/movies/:id
pub async fn handle_show_movie(req: Request<RequestBody>, state: AppState, _user: User) -> HandlerResult {
    let id = read_id_param(req.uri().path())?;
    let movie = db_movies::get(&state.db, id).await?;
    Ok(deliver_envelope("movie", &movie, StatusCode::OK)?)
}

/// PATCH /v1/movies/:id
///
/// Read-modify-write guarded by the row version. A client may pin the
/// version it last saw with `X-Expected-Version`; otherwise the version read
/// here is the one the conditional write must still find.
pub async fn handle_update_movie(req: Request<RequestBody>, state: AppState, user: User) -> HandlerResult {
    let id = read_id_param(req.uri().path())?;
    let expected_version = read_expected_version(req.headers());

    let mut movie = db_movies::get(&state.db, id).await?;

    if let Some(expected) = expected_version {
        if expected != movie.version.to_string() {
            return Err(ApiError::EditConflict);
        }
    }

    let patch: MoviePatch = read_json(req).await?;
    patch.apply_to(&mut movie);
    validate(&movie)?;

    db_movies::update(&state.db, &mut movie).await?;
    info!(movie_id = movie.id, version = movie.version, user_id = user.id, "Movie updated");

    Ok(deliver_envelope("movie", &movie, StatusCode::OK)?)
}

/// DELETE /v1/movies/:id
pub async fn handle_delete_movie(req: Request<RequestBody>, state: AppState, user: User) -> HandlerResult {
    let id = read_id_param(req.uri().path())?;
    db_movies::delete(&state.db, id).await?;
    info!(movie_id = id, user_id = user.id, "Movie deleted");

    Ok(deliver_serialized_json(
        &json!({ "message": "movie successfully deleted" }),
        StatusCode::OK,
    )?)
}
