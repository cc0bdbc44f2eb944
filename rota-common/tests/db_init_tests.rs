//! Database initialization tests

use rota_common::db::init::{init_database, init_in_memory, init_schema};

#[tokio::test]
async fn test_database_created_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("rota.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_reopen_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("rota.db");

    let first = init_database(&db_path).await.unwrap();
    first.close().await;

    let second = init_database(&db_path).await;
    assert!(second.is_ok(), "Failed to reopen: {:?}", second.err());
}

#[tokio::test]
async fn test_schema_init_is_idempotent() {
    let pool = init_in_memory().await.unwrap();
    init_schema(&pool).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "activity_logs",
        "asset_custody",
        "assets",
        "assignments",
        "events",
        "shifts",
        "volunteers",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_second_open_custody_record_rejected() {
    let pool = init_in_memory().await.unwrap();

    sqlx::query("INSERT INTO events (id, name) VALUES ('e1', 'Fest')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO volunteers (id, event_id, name) VALUES ('v1', 'e1', 'Ann')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO assets (id, event_id, name, category) VALUES ('a1', 'e1', 'Radio 1', 'radio')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let open = "INSERT INTO asset_custody (id, asset_id, volunteer_id, checked_out_at) VALUES (?, 'a1', 'v1', '2026-06-01T09:00:00.000Z')";
    sqlx::query(open).bind("c1").execute(&pool).await.unwrap();
    assert!(sqlx::query(open).bind("c2").execute(&pool).await.is_err());

    // Closing the first interval frees the asset for a new loan
    sqlx::query("UPDATE asset_custody SET checked_in_at = '2026-06-01T10:00:00.000Z' WHERE id = 'c1'")
        .execute(&pool)
        .await
        .unwrap();
    assert!(sqlx::query(open).bind("c3").execute(&pool).await.is_ok());
}

#[tokio::test]
async fn test_shift_interval_check_constraint() {
    let pool = init_in_memory().await.unwrap();
    sqlx::query("INSERT INTO events (id, name) VALUES ('e1', 'Fest')")
        .execute(&pool)
        .await
        .unwrap();

    let result = sqlx::query(
        "INSERT INTO shifts (id, event_id, start_time, end_time) VALUES ('s1', 'e1', '2026-06-01T12:00:00.000Z', '2026-06-01T09:00:00.000Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
