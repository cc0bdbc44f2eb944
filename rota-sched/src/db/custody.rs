//! Asset custody records
//!
//! An open record (`checked_in_at IS NULL`) means the asset is on loan. The
//! schema allows at most one open record per asset.

use chrono::{DateTime, Utc};
use rota_common::db::{Asset, CustodyRecord};
use rota_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use super::{opt_ts_col, ts_col, ts_text, uuid_col};

const COLUMNS: &str = "c.id, c.asset_id, c.volunteer_id, c.checked_out_at, c.checked_in_at, c.notes";

fn from_row(row: &SqliteRow) -> Result<CustodyRecord> {
    Ok(CustodyRecord {
        id: uuid_col(row, "id")?,
        asset_id: uuid_col(row, "asset_id")?,
        volunteer_id: uuid_col(row, "volunteer_id")?,
        checked_out_at: ts_col(row, "checked_out_at")?,
        checked_in_at: opt_ts_col(row, "checked_in_at")?,
        notes: row.try_get("notes")?,
    })
}

/// Open a custody record for `asset_id` held by `volunteer_id`
pub async fn open_custody(
    exec: impl SqliteExecutor<'_>,
    asset_id: Uuid,
    volunteer_id: Uuid,
    at: DateTime<Utc>,
) -> Result<CustodyRecord> {
    let record = CustodyRecord {
        id: Uuid::new_v4(),
        asset_id,
        volunteer_id,
        checked_out_at: at,
        checked_in_at: None,
        notes: None,
    };

    sqlx::query(
        "INSERT INTO asset_custody (id, asset_id, volunteer_id, checked_out_at) VALUES (?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(asset_id.to_string())
    .bind(volunteer_id.to_string())
    .bind(ts_text(at))
    .execute(exec)
    .await?;

    Ok(record)
}

pub async fn open_for_volunteer(
    exec: impl SqliteExecutor<'_>,
    volunteer_id: Uuid,
) -> Result<Vec<CustodyRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM asset_custody c WHERE c.volunteer_id = ? AND c.checked_in_at IS NULL ORDER BY c.checked_out_at, c.id",
        COLUMNS
    ))
    .bind(volunteer_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn open_for_asset(
    exec: impl SqliteExecutor<'_>,
    asset_id: Uuid,
) -> Result<Option<CustodyRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM asset_custody c WHERE c.asset_id = ? AND c.checked_in_at IS NULL",
        COLUMNS
    ))
    .bind(asset_id.to_string())
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(from_row).transpose()
}

/// Full history of an asset, newest loan first
pub async fn history_for_asset(
    exec: impl SqliteExecutor<'_>,
    asset_id: Uuid,
) -> Result<Vec<CustodyRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM asset_custody c WHERE c.asset_id = ? ORDER BY c.checked_out_at DESC, c.id",
        COLUMNS
    ))
    .bind(asset_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// Close the open record of one asset held by `volunteer_id`; `false` if none was open
pub async fn close_for_asset(
    exec: impl SqliteExecutor<'_>,
    asset_id: Uuid,
    volunteer_id: Option<Uuid>,
    at: DateTime<Utc>,
) -> Result<bool> {
    let volunteer = volunteer_id.map(|v| v.to_string());
    let result = sqlx::query(
        r#"
        UPDATE asset_custody SET checked_in_at = ?
        WHERE asset_id = ? AND checked_in_at IS NULL AND (? IS NULL OR volunteer_id = ?)
        "#,
    )
    .bind(ts_text(at))
    .bind(asset_id.to_string())
    .bind(&volunteer)
    .bind(&volunteer)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Close every open record of a volunteer; returns the released asset ids
pub async fn close_all_for_volunteer(
    conn: &mut SqliteConnection,
    volunteer_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let open = open_for_volunteer(&mut *conn, volunteer_id).await?;

    sqlx::query(
        "UPDATE asset_custody SET checked_in_at = ? WHERE volunteer_id = ? AND checked_in_at IS NULL",
    )
    .bind(ts_text(at))
    .bind(volunteer_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(open.into_iter().map(|record| record.asset_id).collect())
}

/// Open custody records of a volunteer paired with their assets
pub async fn held_assets(
    conn: &mut SqliteConnection,
    volunteer_id: Uuid,
) -> Result<Vec<(CustodyRecord, Asset)>> {
    let open = open_for_volunteer(&mut *conn, volunteer_id).await?;
    let mut held = Vec::with_capacity(open.len());
    for record in open {
        if let Some(asset) = super::assets::get_asset(&mut *conn, record.asset_id).await? {
            held.push((record, asset));
        }
    }
    Ok(held)
}
