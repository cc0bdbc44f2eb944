//! Asset records

use rota_common::db::{Asset, AssetStatus};
use rota_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteExecutor};
use uuid::Uuid;

use super::{opt_uuid_col, uuid_col};

const COLUMNS: &str = "id, event_id, name, category, identifier, status, volunteer_id, version";

fn from_row(row: &SqliteRow) -> Result<Asset> {
    let status: String = row.try_get("status")?;
    Ok(Asset {
        id: uuid_col(row, "id")?,
        event_id: uuid_col(row, "event_id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        identifier: row.try_get("identifier")?,
        status: status.parse::<AssetStatus>()?,
        volunteer_id: opt_uuid_col(row, "volunteer_id")?,
        version: row.try_get("version")?,
    })
}

pub async fn insert_asset(exec: impl SqliteExecutor<'_>, asset: &Asset) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO assets ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        COLUMNS
    ))
    .bind(asset.id.to_string())
    .bind(asset.event_id.to_string())
    .bind(&asset.name)
    .bind(&asset.category)
    .bind(&asset.identifier)
    .bind(asset.status.as_str())
    .bind(asset.volunteer_id.map(|v| v.to_string()))
    .bind(asset.version)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_asset(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Asset>> {
    let row = sqlx::query(&format!("SELECT {} FROM assets WHERE id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list_for_event(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<Vec<Asset>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM assets WHERE event_id = ? ORDER BY category, name, id",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn list_available(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<Vec<Asset>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM assets WHERE event_id = ? AND status = 'available' ORDER BY category, name, id",
        COLUMNS
    ))
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// Hand an available asset to a volunteer (compare-and-swap on version)
///
/// Also refuses when the asset is no longer `available`.
pub async fn mark_assigned(
    exec: impl SqliteExecutor<'_>,
    id: Uuid,
    volunteer_id: Uuid,
    expected_version: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE assets
        SET status = 'assigned', volunteer_id = ?, version = version + 1
        WHERE id = ? AND version = ? AND status = 'available'
        "#,
    )
    .bind(volunteer_id.to_string())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Release an asset back to the pool
pub async fn mark_available(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE assets SET status = 'available', volunteer_id = NULL, version = version + 1 WHERE id = ?",
    )
    .bind(id.to_string())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}
