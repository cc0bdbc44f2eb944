//! Event records

use rota_common::db::Event;
use rota_common::Result;
use sqlx::{Row, SqliteExecutor};
use uuid::Uuid;

use super::uuid_col;

pub async fn insert_event(exec: impl SqliteExecutor<'_>, event: &Event) -> Result<()> {
    sqlx::query("INSERT INTO events (id, name) VALUES (?, ?)")
        .bind(event.id.to_string())
        .bind(&event.name)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn get_event(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Event>> {
    let row = sqlx::query("SELECT id, name FROM events WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;

    row.map(|row| {
        Ok(Event {
            id: uuid_col(&row, "id")?,
            name: row.try_get("name")?,
        })
    })
    .transpose()
}
