use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

use countersign_core::repository::RepositoryError;

pub mod application;
pub mod principal;

pub use application::SqlApplicationRepository;
pub use principal::SqlPrincipalDirectory;

pub(crate) fn storage_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(error.to_string())
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{field} `{raw}`: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(&value, field)).transpose()
}

pub(crate) fn to_i64<T>(value: T, field: &str) -> Result<i64, RepositoryError>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| RepositoryError::Decode(format!("{field} {value} does not fit in an integer column")))
}

pub(crate) fn from_i64<T>(value: i64, field: &str) -> Result<T, RepositoryError>
where
    T: TryFrom<i64>,
{
    T::try_from(value).map_err(|_| RepositoryError::Decode(format!("{field} {value} is out of range")))
}
