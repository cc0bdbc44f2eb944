//! Activity log (append-only)

use chrono::Utc;
use rota_common::db::{ActivityEntry, ActivityKind, NewActivity};
use rota_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

use super::{opt_uuid_col, ts_col, ts_text, uuid_col};

fn from_row(row: &SqliteRow) -> Result<ActivityEntry> {
    let kind: String = row.try_get("type")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(ActivityEntry {
        id: uuid_col(row, "id")?,
        event_id: uuid_col(row, "event_id")?,
        kind: kind.parse::<ActivityKind>()?,
        description: row.try_get("description")?,
        volunteer_id: opt_uuid_col(row, "volunteer_id")?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: ts_col(row, "created_at")?,
    })
}

/// Append one entry
pub async fn append(exec: impl SqliteExecutor<'_>, entry: NewActivity) -> Result<ActivityEntry> {
    let stored = ActivityEntry {
        id: Uuid::new_v4(),
        event_id: entry.event_id,
        kind: entry.kind,
        description: entry.description,
        volunteer_id: entry.volunteer_id,
        metadata: entry.metadata,
        created_at: Utc::now(),
    };
    let metadata = serde_json::to_string(&stored.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO activity_logs (id, event_id, type, description, volunteer_id, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(stored.id.to_string())
    .bind(stored.event_id.to_string())
    .bind(stored.kind.as_str())
    .bind(&stored.description)
    .bind(stored.volunteer_id.map(|v| v.to_string()))
    .bind(metadata)
    .bind(ts_text(stored.created_at))
    .execute(exec)
    .await?;

    tracing::debug!(
        event_id = %stored.event_id,
        kind = stored.kind.as_str(),
        "Activity logged: {}",
        stored.description
    );

    Ok(stored)
}

/// Most recent entries first
pub async fn recent(
    exec: impl SqliteExecutor<'_>,
    event_id: Uuid,
    limit: usize,
) -> Result<Vec<ActivityEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, event_id, type, description, volunteer_id, metadata, created_at
        FROM activity_logs
        WHERE event_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(event_id.to_string())
    .bind(limit as i64)
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}
