//! Assignment records
//!
//! Updates that act on a caller's snapshot take the snapshot's `version` and
//! only apply when it still matches (compare-and-swap). They return `false`
//! when no row matched; callers turn that into `NotFound` or `ConflictRetry`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rota_common::db::{Assignment, RosterEntry, ShiftRoster};
use rota_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use super::{opt_ts_col, opt_ts_text, ts_text, uuid_col};

const COLUMNS: &str =
    "a.id, a.shift_id, a.volunteer_id, a.checked_in, a.checked_in_at, a.checked_out_at, a.late_dismissed, a.version";

fn from_row(row: &SqliteRow) -> Result<Assignment> {
    Ok(Assignment {
        id: uuid_col(row, "id")?,
        shift_id: uuid_col(row, "shift_id")?,
        volunteer_id: uuid_col(row, "volunteer_id")?,
        checked_in: row.try_get("checked_in")?,
        checked_in_at: opt_ts_col(row, "checked_in_at")?,
        checked_out_at: opt_ts_col(row, "checked_out_at")?,
        late_dismissed: row.try_get("late_dismissed")?,
        version: row.try_get("version")?,
    })
}

pub async fn insert_assignment(exec: impl SqliteExecutor<'_>, assignment: &Assignment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assignments (
            id, shift_id, volunteer_id, checked_in, checked_in_at,
            checked_out_at, late_dismissed, version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(assignment.id.to_string())
    .bind(assignment.shift_id.to_string())
    .bind(assignment.volunteer_id.to_string())
    .bind(assignment.checked_in)
    .bind(opt_ts_text(assignment.checked_in_at))
    .bind(opt_ts_text(assignment.checked_out_at))
    .bind(assignment.late_dismissed)
    .bind(assignment.version)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn get_assignment(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Assignment>> {
    let row = sqlx::query(&format!("SELECT {} FROM assignments a WHERE a.id = ?", COLUMNS))
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn find_pair(
    exec: impl SqliteExecutor<'_>,
    volunteer_id: Uuid,
    shift_id: Uuid,
) -> Result<Option<Assignment>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assignments a WHERE a.volunteer_id = ? AND a.shift_id = ?",
        COLUMNS
    ))
    .bind(volunteer_id.to_string())
    .bind(shift_id.to_string())
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn list_for_shift(exec: impl SqliteExecutor<'_>, shift_id: Uuid) -> Result<Vec<Assignment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM assignments a WHERE a.shift_id = ? ORDER BY a.id",
        COLUMNS
    ))
    .bind(shift_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn list_for_volunteer(
    exec: impl SqliteExecutor<'_>,
    volunteer_id: Uuid,
) -> Result<Vec<Assignment>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM assignments a WHERE a.volunteer_id = ? ORDER BY a.id",
        COLUMNS
    ))
    .bind(volunteer_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// All assignments on shifts of an event
pub async fn list_for_event(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<Vec<Assignment>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM assignments a
        JOIN shifts s ON s.id = a.shift_id
        WHERE s.event_id = ?
        ORDER BY s.start_time, a.id
        "#,
        COLUMNS
    ))
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// Delete every assignment on the event's shifts; returns rows removed
pub async fn delete_for_event(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM assignments WHERE shift_id IN (SELECT id FROM shifts WHERE event_id = ?)",
    )
    .bind(event_id.to_string())
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_for_shift(exec: impl SqliteExecutor<'_>, shift_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM assignments WHERE shift_id = ?")
        .bind(shift_id.to_string())
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_assignment(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(id.to_string())
        .execute(exec)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Point an assignment at another volunteer (compare-and-swap on version)
pub async fn set_volunteer(
    exec: impl SqliteExecutor<'_>,
    id: Uuid,
    volunteer_id: Uuid,
    expected_version: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE assignments SET volunteer_id = ?, version = version + 1 WHERE id = ? AND version = ?",
    )
    .bind(volunteer_id.to_string())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Check in: set flag and time, clear any earlier checkout
///
/// `expected_version = None` skips the version check.
pub async fn mark_checked_in(
    exec: impl SqliteExecutor<'_>,
    id: Uuid,
    at: DateTime<Utc>,
    expected_version: Option<i64>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE assignments
        SET checked_in = 1, checked_in_at = ?, checked_out_at = NULL, version = version + 1
        WHERE id = ? AND (? IS NULL OR version = ?)
        "#,
    )
    .bind(ts_text(at))
    .bind(id.to_string())
    .bind(expected_version)
    .bind(expected_version)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Close an assignment; `clear_flag` also resets `checked_in`
pub async fn mark_checked_out(
    exec: impl SqliteExecutor<'_>,
    id: Uuid,
    at: DateTime<Utc>,
    clear_flag: bool,
    expected_version: Option<i64>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE assignments
        SET checked_out_at = ?,
            checked_in = CASE WHEN ? THEN 0 ELSE checked_in END,
            version = version + 1
        WHERE id = ? AND (? IS NULL OR version = ?)
        "#,
    )
    .bind(ts_text(at))
    .bind(clear_flag)
    .bind(id.to_string())
    .bind(expected_version)
    .bind(expected_version)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_late_dismissed(
    exec: impl SqliteExecutor<'_>,
    id: Uuid,
    dismissed: bool,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE assignments SET late_dismissed = ?, version = version + 1 WHERE id = ?",
    )
    .bind(dismissed)
    .bind(id.to_string())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record that a late warning went out; `false` if one already had
pub async fn mark_late_warned(exec: impl SqliteExecutor<'_>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE assignments SET late_warned = 1 WHERE id = ? AND late_warned = 0")
        .bind(id.to_string())
        .execute(exec)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn late_warned_ids(exec: impl SqliteExecutor<'_>, event_id: Uuid) -> Result<HashSet<Uuid>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT a.id FROM assignments a
        JOIN shifts s ON s.id = a.shift_id
        WHERE s.event_id = ? AND a.late_warned = 1
        "#,
    )
    .bind(event_id.to_string())
    .fetch_all(exec)
    .await?;
    rows.iter().map(|id| rota_common::uuid_utils::parse(id)).collect()
}

/// Shifts of an event with their assignments and resolved volunteers
///
/// Assignments whose volunteer row is missing are skipped.
pub async fn load_rosters(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Vec<ShiftRoster>> {
    let shifts = super::shifts::list_for_event(&mut *conn, event_id).await?;
    let volunteers: HashMap<Uuid, _> = super::volunteers::list_for_event(&mut *conn, event_id)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();
    let assignments = list_for_event(&mut *conn, event_id).await?;

    let mut by_shift: HashMap<Uuid, Vec<RosterEntry>> = HashMap::new();
    for assignment in assignments {
        let Some(volunteer) = volunteers.get(&assignment.volunteer_id) else {
            tracing::warn!(
                assignment_id = %assignment.id,
                volunteer_id = %assignment.volunteer_id,
                "Assignment references a volunteer outside the event, skipped"
            );
            continue;
        };
        by_shift.entry(assignment.shift_id).or_default().push(RosterEntry {
            volunteer: volunteer.clone(),
            assignment,
        });
    }

    Ok(shifts
        .into_iter()
        .map(|shift| ShiftRoster {
            assignments: by_shift.remove(&shift.id).unwrap_or_default(),
            shift,
        })
        .collect())
}
