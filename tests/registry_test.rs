//! Integration tests for the named database registry.
//!
//! Tests verify that:
//! - `start` brings up all configured databases and `get` finds them by name
//! - Duplicate names are rejected without disturbing the existing manager
//! - `close` removes one database; `shutdown` removes them all

use sqlgate::{DatabaseConfig, DatabaseRegistry, DbError, SqlParam};
use tempfile::NamedTempFile;

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
async fn test_start_and_lookup_by_name() {
    let registry = DatabaseRegistry::new();
    registry
        .start(vec![
            DatabaseConfig::sqlite("default", temp_db_path()),
            DatabaseConfig::sqlite("stats", temp_db_path()),
        ])
        .await
        .unwrap();

    assert_eq!(registry.count().await, 2);
    assert!(registry.has("default").await);
    assert!(registry.has("stats").await);

    let stats = registry.get("stats").await.unwrap();
    assert_eq!(stats.name(), "stats");
    assert_eq!(stats.backend_kind(), "sqlite");

    let default = registry.default_database().await.unwrap();
    assert_eq!(default.name(), "default");

    registry.shutdown().await;
}

#[tokio::test]
async fn test_registered_manager_is_usable() {
    let registry = DatabaseRegistry::new();
    let manager = registry
        .register(DatabaseConfig::sqlite("game", temp_db_path()))
        .await
        .unwrap();

    let create = manager
        .prepare("CREATE TABLE scores (player TEXT, value INTEGER)")
        .unwrap();
    manager.update(create, vec![]).await.unwrap();

    let insert = manager
        .prepare("INSERT INTO scores (player, value) VALUES (?, ?)")
        .unwrap();
    let affected = manager
        .update(insert, vec![SqlParam::from("alice"), SqlParam::from(12)])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    // The registry hands back the same manager
    let same = registry.get("game").await.unwrap();
    let select = same.prepare("SELECT value FROM scores WHERE player = ?").unwrap();
    let rows = same
        .query(select, vec![SqlParam::from("alice")])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let registry = DatabaseRegistry::new();
    registry
        .register(DatabaseConfig::sqlite("game", temp_db_path()))
        .await
        .unwrap();

    let result = registry
        .register(DatabaseConfig::sqlite("game", temp_db_path()))
        .await;
    assert!(matches!(result, Err(DbError::ConfigInvalid { .. })));

    // The original registration survives
    let manager = registry.get("game").await.unwrap();
    assert!(!manager.is_closed());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_name_errors() {
    let registry = DatabaseRegistry::new();

    let result = registry.get("missing").await;
    assert!(matches!(result, Err(DbError::UnknownDatabase { .. })));

    let result = registry.close("missing").await;
    assert!(matches!(result, Err(DbError::UnknownDatabase { .. })));
}

#[tokio::test]
async fn test_close_removes_one_database() {
    let registry = DatabaseRegistry::new();
    registry
        .start(vec![
            DatabaseConfig::sqlite("default", temp_db_path()),
            DatabaseConfig::sqlite("stats", temp_db_path()),
        ])
        .await
        .unwrap();

    let stats = registry.get("stats").await.unwrap();
    registry.close("stats").await.unwrap();

    assert!(stats.is_closed());
    assert!(!registry.has("stats").await);
    assert_eq!(registry.count().await, 1);
    assert!(registry.has("default").await);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let registry = DatabaseRegistry::new();
    registry
        .start(vec![
            DatabaseConfig::sqlite("default", temp_db_path()),
            DatabaseConfig::sqlite("stats", temp_db_path()),
        ])
        .await
        .unwrap();

    let default = registry.get("default").await.unwrap();
    let stats = registry.get("stats").await.unwrap();

    registry.shutdown().await;

    assert_eq!(registry.count().await, 0);
    assert!(default.is_closed());
    assert!(stats.is_closed());

    // Idempotent
    registry.shutdown().await;
}

#[tokio::test]
async fn test_start_fails_fast_on_invalid_config() {
    let registry = DatabaseRegistry::new();
    let result = registry
        .start(vec![DatabaseConfig::sqlite("", temp_db_path())])
        .await;
    assert!(matches!(result, Err(DbError::ConfigInvalid { .. })));
}
