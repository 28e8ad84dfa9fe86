use bricksberg_db::schema::{CURRENT_VERSION, get_schema_version};
use bricksberg_db::*;

#[test]
fn memory_database_has_current_version() {
    let conn = open_memory().unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
}

#[test]
fn lock_and_wake_rows_are_seeded() {
    let conn = open_memory().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM scheduler_lock", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM scheduler_wake", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn reopening_file_database_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bricksberg.db");

    {
        let conn = open_database(&path).unwrap();
        conn.execute(
            "INSERT INTO entities (kind, title) VALUES ('color', 'Black')",
            [],
        )
        .unwrap();
    }

    let conn = open_database(&path).unwrap();
    let title: String = conn
        .query_row("SELECT title FROM entities WHERE kind = 'color'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(title, "Black");
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
    let versions: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, 1);
}
