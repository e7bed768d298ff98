use shared::types::{Filters, Metadata, Movie, Runtime};
use shared::types::filters::calculate_metadata;
use sqlx::FromRow;

use super::utils::{from_json_list, from_timestamp, get_timestamp, to_json_list};
use super::{DataError, Database, Result};

#[derive(Debug, FromRow)]
struct MovieRow {
    id: i64,
    created_at: i64,
    title: String,
    year: i32,
    runtime: i32,
    genres: String,
    version: i32,
}

impl TryFrom<MovieRow> for Movie {
    type Error = DataError;

    fn try_from(row: MovieRow) -> Result<Self> {
        Ok(Movie {
            id: row.id,
            created_at: from_timestamp(row.created_at)?,
            title: row.title,
            year: row.year,
            runtime: Runtime(row.runtime),
            genres: from_json_list(&row.genres)?,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct ListedMovieRow {
    total_records: i64,
    #[sqlx(flatten)]
    movie: MovieRow,
}

/// Insert a new movie, filling in `id`, `created_at` and `version` (always 1).
pub async fn insert(db: &Database, movie: &mut Movie) -> Result<()> {
    let genres = to_json_list(&movie.genres)?;
    let now = get_timestamp();

    let (id, version) = db
        .timed(
            sqlx::query_as::<_, (i64, i32)>(
                "INSERT INTO movies (created_at, title, year, runtime, genres)
                 VALUES (?, ?, ?, ?, ?)
                 RETURNING id, version",
            )
            .bind(now)
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&genres)
            .fetch_one(db.pool()),
        )
        .await?;

    movie.id = id;
    movie.version = version;
    movie.created_at = from_timestamp(now)?;
    Ok(())
}

pub async fn get(db: &Database, id: i64) -> Result<Movie> {
    if id < 1 {
        return Err(DataError::RecordNotFound);
    }

    let row = db
        .timed(
            sqlx::query_as::<_, MovieRow>(
                "SELECT id, created_at, title, year, runtime, genres, version
                 FROM movies WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(db.pool()),
        )
        .await?;

    row.ok_or(DataError::RecordNotFound)?.try_into()
}

/// Conditional write: succeeds only while the stored version still equals
/// `movie.version`, then bumps it by one and writes the new value back into
/// `movie`. A vanished row and a stale version both surface as
/// `EditConflict`.
pub async fn update(db: &Database, movie: &mut Movie) -> Result<()> {
    let genres = to_json_list(&movie.genres)?;

    let new_version = db
        .timed(
            sqlx::query_scalar::<_, i32>(
                "UPDATE movies
                 SET title = ?, year = ?, runtime = ?, genres = ?, version = version + 1
                 WHERE id = ? AND version = ?
                 RETURNING version",
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&genres)
            .bind(movie.id)
            .bind(movie.version)
            .fetch_optional(db.pool()),
        )
        .await?;

    match new_version {
        Some(version) => {
            movie.version = version;
            Ok(())
        }
        None => Err(DataError::EditConflict),
    }
}

pub async fn delete(db: &Database, id: i64) -> Result<()> {
    if id < 1 {
        return Err(DataError::RecordNotFound);
    }

    let result = db
        .timed(
            sqlx::query("DELETE FROM movies WHERE id = ?")
                .bind(id)
                .execute(db.pool()),
        )
        .await?;

    if result.rows_affected() == 0 {
        return Err(DataError::RecordNotFound);
    }
    Ok(())
}

/// One page of movies whose title contains `title` (case-insensitive, empty
/// matches everything) and whose genres include every entry of `genres`.
/// Rows are ordered by the requested column with `id` as the tie-breaker.
pub async fn get_all(
    db: &Database,
    title: &str,
    genres: &[String],
    filters: &Filters,
) -> Result<(Vec<Movie>, Metadata)> {
    // Only safelisted column names ever reach the ORDER BY clause.
    let column = filters
        .sort_column()
        .ok_or_else(|| DataError::UnsafeSort(filters.sort.clone()))?;
    let wanted_genres = to_json_list(genres)?;

    let query = format!(
        "SELECT count(*) OVER() AS total_records,
                id, created_at, title, year, runtime, genres, version
         FROM movies
         WHERE (?1 = '' OR instr(lower(title), lower(?1)) > 0)
           AND NOT EXISTS (
               SELECT 1 FROM json_each(?2) AS wanted
               WHERE wanted.value NOT IN (SELECT have.value FROM json_each(movies.genres) AS have)
           )
         ORDER BY {} {}, id ASC
         LIMIT ?3 OFFSET ?4",
        column,
        filters.sort_direction()
    );

    let rows = db
        .timed(
            sqlx::query_as::<_, ListedMovieRow>(&query)
                .bind(title)
                .bind(&wanted_genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(db.pool()),
        )
        .await?;

    let total_records = rows.first().map(|r| r.total_records).unwrap_or(0);
    let movies = rows
        .into_iter()
        .map(|r| Movie::try_from(r.movie))
        .collect::<Result<Vec<_>>>()?;

    Ok((movies, calculate_metadata(total_records, filters.page, filters.page_size)))
}
