//! Database initialization
//!
//! Creates the SQLite file on first run and brings the schema up to date.
//! All statements are idempotent (`IF NOT EXISTS`), so every service start
//! runs the full sequence.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database file and initialize the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets kiosks read while the dashboard writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// One connection only: every `sqlite::memory:` connection is its own database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_events_table(pool).await?;
    create_volunteers_table(pool).await?;
    create_shifts_table(pool).await?;
    create_assignments_table(pool).await?;
    create_assets_table(pool).await?;
    create_asset_custody_table(pool).await?;
    create_activity_logs_table(pool).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_volunteers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volunteers (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            group_name TEXT,
            max_hours REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_volunteers_event ON volunteers(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_shifts_table(pool: &SqlitePool) -> Result<()> {
    // Timestamps are fixed-width RFC 3339 UTC text, so text comparison is chronological
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shifts (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            name TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            required_groups TEXT NOT NULL DEFAULT '{}',
            allowed_groups TEXT NOT NULL DEFAULT '[]',
            excluded_groups TEXT NOT NULL DEFAULT '[]',
            CHECK (end_time > start_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_shifts_event ON shifts(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            shift_id TEXT NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
            volunteer_id TEXT NOT NULL REFERENCES volunteers(id) ON DELETE CASCADE,
            checked_in INTEGER NOT NULL DEFAULT 0,
            checked_in_at TEXT,
            checked_out_at TEXT,
            late_dismissed INTEGER NOT NULL DEFAULT 0,
            late_warned INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            UNIQUE (volunteer_id, shift_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assignments_shift ON assignments(shift_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            identifier TEXT,
            status TEXT NOT NULL DEFAULT 'available'
                CHECK (status IN ('available', 'assigned', 'maintenance', 'lost')),
            volunteer_id TEXT REFERENCES volunteers(id) ON DELETE SET NULL,
            version INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assets_event ON assets(event_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_asset_custody_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_custody (
            id TEXT PRIMARY KEY,
            asset_id TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
            volunteer_id TEXT NOT NULL REFERENCES volunteers(id) ON DELETE CASCADE,
            checked_out_at TEXT NOT NULL,
            checked_in_at TEXT,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one open custody record per asset
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_custody_open_asset
        ON asset_custody(asset_id) WHERE checked_in_at IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_custody_volunteer ON asset_custody(volunteer_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_activity_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activity_logs (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            type TEXT NOT NULL,
            description TEXT NOT NULL,
            volunteer_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activity_event_time ON activity_logs(event_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
