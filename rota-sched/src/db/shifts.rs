//! Shift records
//!
//! Required groups are written as canonical JSON. On read, whatever the column
//! holds (canonical map, token list, or a delimited string left by an older
//! import) goes back through the boundary parser.

use rota_common::db::Shift;
use rota_common::required_groups::group_list_from_json;
use rota_common::{Error, RequiredGroups, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

use super::{ts_col, ts_text, uuid_col};

const COLUMNS: &str =
    "id, event_id, name, start_time, end_time, required_groups, allowed_groups, excluded_groups";

/// Decode a JSON text column, falling back to treating the raw text as a string value
fn json_or_text(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn from_row(row: &SqliteRow) -> Result<Shift> {
    let required: String = row.try_get("required_groups")?;
    let allowed: String = row.try_get("allowed_groups")?;
    let excluded: String = row.try_get("excluded_groups")?;

    Ok(Shift {
        id: uuid_col(row, "id")?,
        event_id: uuid_col(row, "event_id")?,
        name: row.try_get("name")?,
        start_time: ts_col(row, "start_time")?,
        end_time: ts_col(row, "end_time")?,
        required_groups: RequiredGroups::from_json(&json_or_text(&required)),
        allowed_groups: group_list_from_json(&json_or_text(&allowed)),
        excluded_groups: group_list_from_json(&json_or_text(&excluded)),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub async fn insert_shift(exec: impl SqliteExecutor<'_>, shift: &Shift) -> Result<()> {
    if shift.end_time <= shift.start_time {
        return Err(Error::ShiftInterval {
            shift: shift.id.to_string(),
            start: ts_text(shift.start_time),
            end: ts_text(shift.end_time),
        });
    }

    sqlx::query(&format!(
        "INSERT INTO shifts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    ))
    .bind(shift.id.to_string())
    .bind(shift.event_id.to_string())
    .bind(&shift.name)
    .bind(ts_text(shift.start_time))
    .bind(ts_text(shift.end_time))
    .bind(to_json(&shift.required_groups)?)
    .bind(to_json(&shift.allowed_groups)?)
    .bind(to_json(&shift.excluded_groups)?)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_shift(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Shift>> {
    let row = sqlx::query(&format!("SELECT {} FROM shifts WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// All shifts of an event in chronological order
pub async fn list_for_event(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<Vec<Shift>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM shifts WHERE event_id = ? ORDER BY start_time, id",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}
