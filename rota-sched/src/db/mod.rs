//! Assignment Store repository layer
//!
//! Free functions over `sqlx` executors, one module per table. Single-statement
//! functions accept any `SqliteExecutor` (pool or open transaction);
//! multi-statement functions take a `&mut SqliteConnection` so callers can run
//! them inside a transaction.
//!
//! Ids and timestamps are stored as TEXT (UUID strings, fixed-width RFC 3339).

pub mod activity;
pub mod assets;
pub mod assignments;
pub mod custody;
pub mod events;
pub mod shifts;
pub mod volunteers;

use chrono::{DateTime, Utc};
use rota_common::{time, uuid_utils, Result};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

pub(crate) fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    uuid_utils::parse(&raw)
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(uuid_utils::parse).transpose()
}

pub(crate) fn ts_col(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    time::parse_timestamp(&raw)
}

pub(crate) fn opt_ts_col(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.as_deref().map(time::parse_timestamp).transpose()
}

pub(crate) fn ts_text(ts: DateTime<Utc>) -> String {
    time::format_timestamp(ts)
}

pub(crate) fn opt_ts_text(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(time::format_timestamp)
}
