//! Integration tests for the SQLite backend.
//!
//! Tests verify that:
//! - Prepared statements execute with bound parameters and round-trip values
//! - Updates report affected row counts and run strictly in submission order
//! - Raw execution is gated behind the configuration flag
//! - Unknown handles and closed managers fail fast with the right errors

use futures_util::future::join_all;
use serde_json::json;
use sqlgate::{DatabaseConfig, DatabaseManager, DbError, SqlParam};
use tempfile::NamedTempFile;

/// Open a manager on a fresh temp database with a `users` table.
async fn setup_manager() -> DatabaseManager {
    let db_path = temp_db_path();
    let manager = DatabaseManager::connect(DatabaseConfig::sqlite("test", &db_path))
        .await
        .unwrap();

    let create = manager
        .prepare("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, score REAL, avatar BLOB)")
        .unwrap();
    manager.update(create, vec![]).await.unwrap();

    manager
}

fn temp_db_path() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_insert_reports_rows_affected() {
    let manager = setup_manager().await;

    let insert = manager
        .prepare("INSERT INTO users (id, name, age) VALUES (?, ?, ?)")
        .unwrap();
    let affected = manager
        .update(
            insert,
            vec![SqlParam::from(1), SqlParam::from("Alice"), SqlParam::from(30)],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let update = manager
        .prepare("UPDATE users SET age = ? WHERE name = ?")
        .unwrap();
    let affected = manager
        .update(update, vec![SqlParam::from(31), SqlParam::from("Alice")])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    manager.close().await;
}

#[tokio::test]
async fn test_query_round_trips_values() {
    let manager = setup_manager().await;

    let insert = manager
        .prepare("INSERT INTO users (id, name, age, score, avatar) VALUES (?, ?, ?, ?, ?)")
        .unwrap();
    manager
        .update(
            insert,
            vec![
                SqlParam::from(1),
                SqlParam::from("Alice"),
                SqlParam::Null,
                SqlParam::from(1.5),
                SqlParam::from(vec![0u8, 0x9F, 0x92, 0x96]),
            ],
        )
        .await
        .unwrap();

    let select = manager
        .prepare("SELECT id, name, age, score, avatar FROM users WHERE id = ?")
        .unwrap();
    let rows = manager.query(select, vec![SqlParam::from(1)]).await.unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("id"), Some(&json!(1)));
    assert_eq!(row.get("name"), Some(&json!("Alice")));
    assert_eq!(row.get("age"), Some(&json!(null)));
    assert_eq!(row.get("score"), Some(&json!(1.5)));
    // Non-UTF-8 blobs come back base64 encoded
    assert_eq!(row.get("avatar"), Some(&json!("AJ+Slg==")));

    manager.close().await;
}

#[tokio::test]
async fn test_query_empty_result_set() {
    let manager = setup_manager().await;

    let select = manager
        .prepare("SELECT * FROM users WHERE id = ?")
        .unwrap();
    let rows = manager
        .query(select, vec![SqlParam::from(999)])
        .await
        .unwrap();
    assert!(rows.is_empty());

    manager.close().await;
}

#[tokio::test]
async fn test_updates_run_in_submission_order() {
    let manager = setup_manager().await;

    let create = manager
        .prepare("CREATE TABLE log (seq INTEGER PRIMARY KEY AUTOINCREMENT, marker INTEGER)")
        .unwrap();
    manager.update(create, vec![]).await.unwrap();

    // Submit a burst of writes without awaiting any of them, then verify
    // the table saw them in exactly the submission order.
    let insert = manager
        .prepare("INSERT INTO log (marker) VALUES (?)")
        .unwrap();
    let pending: Vec<_> = (0..50)
        .map(|i| manager.update(insert, vec![SqlParam::from(i)]))
        .collect();
    for affected in join_all(pending).await {
        assert_eq!(affected.unwrap(), 1);
    }

    let select = manager
        .prepare("SELECT marker FROM log ORDER BY seq")
        .unwrap();
    let rows = manager.query(select, vec![]).await.unwrap();
    let markers: Vec<i64> = rows
        .iter()
        .map(|row| row.get("marker").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(markers, (0..50).collect::<Vec<i64>>());

    manager.close().await;
}

#[tokio::test]
async fn test_failed_statement_surfaces_error() {
    let manager = setup_manager().await;

    let insert = manager
        .prepare("INSERT INTO users (id, name) VALUES (?, ?)")
        .unwrap();
    manager
        .update(insert, vec![SqlParam::from(1), SqlParam::from("Alice")])
        .await
        .unwrap();

    // Primary key collision
    let result = manager
        .update(insert, vec![SqlParam::from(1), SqlParam::from("Bob")])
        .await;
    assert!(matches!(result, Err(DbError::StatementFailed { .. })));

    // The manager stays usable after a failed statement
    let affected = manager
        .update(insert, vec![SqlParam::from(2), SqlParam::from("Bob")])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    manager.close().await;
}

#[tokio::test]
async fn test_unknown_statement_handle() {
    let manager = setup_manager().await;

    let result = manager.update(9999, vec![]).await;
    assert!(matches!(
        result,
        Err(DbError::UnknownStatement { handle: 9999 })
    ));

    let result = manager.query(9999, vec![]).await;
    assert!(matches!(
        result,
        Err(DbError::UnknownStatement { handle: 9999 })
    ));

    manager.close().await;
}

#[tokio::test]
async fn test_duplicate_prepare_yields_distinct_handles() {
    let manager = setup_manager().await;

    let first = manager.prepare("SELECT 1").unwrap();
    let second = manager.prepare("SELECT 1").unwrap();
    assert_ne!(first, second);

    manager.close().await;
}

#[tokio::test]
async fn test_execute_raw_disabled_by_default() {
    let manager = setup_manager().await;

    let result = manager.execute_raw("CREATE TABLE raw_t (id INTEGER)").await;
    assert!(matches!(result, Err(DbError::ExecutionDisabled)));

    manager.close().await;
}

#[tokio::test]
async fn test_execute_raw_when_opted_in() {
    let db_path = temp_db_path();
    let manager = DatabaseManager::connect(
        DatabaseConfig::sqlite("test-raw", &db_path).with_raw_execute(),
    )
    .await
    .unwrap();

    manager
        .execute_raw("CREATE TABLE raw_t (id INTEGER)")
        .await
        .unwrap();

    let insert = manager.prepare("INSERT INTO raw_t (id) VALUES (?)").unwrap();
    let affected = manager.update(insert, vec![SqlParam::from(7)]).await.unwrap();
    assert_eq!(affected, 1);

    manager.close().await;
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let manager = setup_manager().await;
    let insert = manager
        .prepare("INSERT INTO users (id, name) VALUES (?, ?)")
        .unwrap();

    manager.close().await;
    assert!(manager.is_closed());

    assert!(matches!(
        manager.prepare("SELECT 1"),
        Err(DbError::ManagerClosed)
    ));
    assert!(matches!(
        manager.update(insert, vec![]).await,
        Err(DbError::ManagerClosed)
    ));
    assert!(matches!(
        manager.query(insert, vec![]).await,
        Err(DbError::ManagerClosed)
    ));
    assert!(matches!(
        manager.execute_raw("SELECT 1").await,
        Err(DbError::ManagerClosed)
    ));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let manager = setup_manager().await;
    manager.close().await;
    manager.close().await;
    assert!(manager.is_closed());
}

#[tokio::test]
async fn test_close_drains_queued_writes() {
    let manager = setup_manager().await;

    let insert = manager
        .prepare("INSERT INTO users (id, name) VALUES (?, ?)")
        .unwrap();
    let pending: Vec<_> = (0..20)
        .map(|i| {
            manager.update(
                insert,
                vec![SqlParam::from(i), SqlParam::from(format!("user{i}"))],
            )
        })
        .collect();

    // Close immediately; the queued writes were accepted, so they complete.
    manager.close().await;

    for affected in join_all(pending).await {
        assert_eq!(affected.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_creates_missing_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("deep").join("app.db");

    let manager = DatabaseManager::connect(DatabaseConfig::sqlite("test-nested", &db_path))
        .await
        .unwrap();
    assert!(db_path.exists());

    manager.close().await;
}
