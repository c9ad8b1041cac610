use livequery_core::db::migrations::{apply_migrations, latest_version};
use livequery_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "records");
    assert_table_exists(&conn, "retired_record_ids");
    assert!(conn.is_autocommit(), "fresh connection must not stage writes");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("livequery.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "records");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn apply_migrations_reports_how_many_steps_ran() {
    let mut conn = Connection::open_in_memory().unwrap();
    assert_eq!(apply_migrations(&mut conn).unwrap(), 2);
    assert_eq!(apply_migrations(&mut conn).unwrap(), 0);

    let mut partial = Connection::open_in_memory().unwrap();
    partial
        .execute_batch(include_str!("../src/db/migrations/0001_records.sql"))
        .unwrap();
    partial.execute_batch("PRAGMA user_version = 1;").unwrap();
    assert_eq!(apply_migrations(&mut partial).unwrap(), 1);
    assert_table_exists(&partial, "retired_record_ids");
}

#[test]
fn failing_step_names_the_migration_and_keeps_old_version() {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE scratch (uuid TEXT);
         CREATE INDEX retired_record_ids ON scratch(uuid);",
    )
    .unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_records.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();

    match apply_migrations(&mut conn).unwrap_err() {
        DbError::MigrationFailed { version, name, .. } => {
            assert_eq!(version, 2);
            assert_eq!(name, "retired_ids");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(schema_version(&conn), 1);
}

#[test]
fn records_table_rejects_blank_kind() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO records (uuid, kind, fields, created_at, updated_at)
         VALUES ('00000000-0000-4000-8000-000000000001', '  ', '{}', 0, 0);",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
