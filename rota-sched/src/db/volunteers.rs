//! Volunteer records

use rota_common::db::Volunteer;
use rota_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

use super::uuid_col;

const COLUMNS: &str = "id, event_id, name, group_name, max_hours";

fn from_row(row: &SqliteRow) -> Result<Volunteer> {
    Ok(Volunteer {
        id: uuid_col(row, "id")?,
        event_id: uuid_col(row, "event_id")?,
        name: row.try_get("name")?,
        group: row.try_get("group_name")?,
        max_hours: row.try_get("max_hours")?,
    })
}

pub async fn insert_volunteer(exec: impl SqliteExecutor<'_>, volunteer: &Volunteer) -> Result<()> {
    sqlx::query(
        "INSERT INTO volunteers (id, event_id, name, group_name, max_hours) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(volunteer.id.to_string())
    .bind(volunteer.event_id.to_string())
    .bind(&volunteer.name)
    .bind(&volunteer.group)
    .bind(volunteer.max_hours)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_volunteer(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Volunteer>> {
    let row = sqlx::query(&format!("SELECT {} FROM volunteers WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list_for_event(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<Vec<Volunteer>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM volunteers WHERE event_id = ? ORDER BY name, id",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn list_by_group(
    exec: impl SqliteExecutor<'_>,
    event_id: Uuid,
    group: &str,
) -> Result<Vec<Volunteer>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM volunteers WHERE event_id = ? AND group_name = ? ORDER BY name, id",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .bind(group)
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// Case-insensitive substring match on name, capped at `limit` rows
pub async fn search_by_name(
    exec: impl SqliteExecutor<'_>,
    event_id: Uuid,
    query: &str,
    limit: usize,
) -> Result<Vec<Volunteer>> {
    let pattern = format!("%{}%", escape_like(&query.trim().to_lowercase()));
    let rows = sqlx::query(&format!(
        "SELECT {} FROM volunteers WHERE event_id = ? AND LOWER(name) LIKE ? ESCAPE '\\' ORDER BY name, id LIMIT ?",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .bind(pattern)
    .bind(limit as i64)
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("ann"), "ann");
    }
}
