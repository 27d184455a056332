use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::runtime::Runtime;
use crate::validator::{unique, Validator};

/// A catalog entry. `id`, `created_at` and `version` are owned by the store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(default, skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl Movie {
    /// A movie that has not been stored yet.
    pub fn new(title: impl Into<String>, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Movie {
            id: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            title: title.into(),
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

/// Oldest year a film can have been made in.
pub const EARLIEST_YEAR: i32 = 1888;

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(
        movie.title.len() <= 500,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(movie.year != 0, "year", "must be provided");
    v.check(
        movie.year >= EARLIEST_YEAR,
        "year",
        "must be greater than 1888",
    );
    v.check(
        movie.year <= Utc::now().year(),
        "year",
        "must not be in the future",
    );

    v.check(movie.runtime.minutes() != 0, "runtime", "must be provided");
    v.check(
        movie.runtime.minutes() > 0,
        "runtime",
        "must be a positive integer",
    );

    v.check(
        !movie.genres.is_empty(),
        "genres",
        "must contain at least 1 genre",
    );
    v.check(
        movie.genres.len() <= 5,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        unique(&movie.genres),
        "genres",
        "must not contain duplicate values",
    );
}
