//! Purpose: Exercise `Database` row operations against real database files.
//! Role: Validate schema-driven statements end to end, including awkward identifiers.
//! Invariants: Each test uses its own temp directory.

use krd::core::db::Database;
use krd::core::error::ErrorKind;
use krd::core::page::PageKind;
use krd::core::value::Cell;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn seeded(sql: &str) -> TestResult<(tempfile::TempDir, Database)> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("ops.db");
    let conn = rusqlite::Connection::open(&path)?;
    conn.execute_batch(sql)?;
    drop(conn);
    let db = Database::open(&path)?;
    Ok((temp, db))
}

fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn duplicate_assigns_fresh_integer_key() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, pinned INTEGER);
         INSERT INTO notes (body, pinned) VALUES ('first', 1), ('second', 0);",
    )?;

    db.duplicate_row("notes", 2)?;
    let page = db.table_page("notes")?;
    assert_eq!(page.rows.len(), 3);
    let copy = page.rows.last().ok_or("copy row")?;
    assert_eq!(copy.rowid, Some(3));
    assert_eq!(copy.cells[0], Cell::Integer(3));
    assert_eq!(copy.cells[1], Cell::Text("second".to_string()));
    assert_eq!(copy.cells[2], Cell::Integer(0));

    db.duplicate_row("notes", 42)?;
    assert_eq!(db.table_page("notes")?.rows.len(), 3);
    Ok(())
}

#[test]
fn quoted_identifiers_round_trip() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE \"order items\" (\"unit \"\"price\"\"\" REAL, sku TEXT);
         INSERT INTO \"order items\" VALUES (2.5, 'a-1');",
    )?;

    db.insert_row(
        "order items",
        &fields(&[("table", "order items"), ("unit \"price\"", "4"), ("sku", "b-2")]),
    )?;
    let page = db.sorted_page("order items", "unit \"price\"")?;
    let prices: Vec<_> = page.rows.iter().map(|row| row.cells[0].clone()).collect();
    assert_eq!(prices, vec![Cell::Real(2.5), Cell::Real(4.0)]);
    Ok(())
}

#[test]
fn table_names_resolve_case_insensitively() -> TestResult<()> {
    let (_temp, db) = seeded("CREATE TABLE Events (title TEXT); INSERT INTO Events VALUES ('x');")?;
    let page = db.table_page("events")?;
    assert_eq!(page.name, "Events");
    assert_eq!(page.kind, PageKind::Table);
    let table = db.insert_row("EVENTS", &fields(&[("title", "y")]))?;
    assert_eq!(table, "Events");
    Ok(())
}

#[test]
fn update_with_only_blob_fields_is_a_no_op() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE assets (name TEXT, data BLOB);
         INSERT INTO assets VALUES ('logo', x'89504e47');",
    )?;
    db.update_row("assets", 1, &fields(&[("table", "assets"), ("rowid", "1"), ("data", "")]))?;

    let conn = rusqlite::Connection::open(db.path())?;
    let data: Vec<u8> = conn.query_row("SELECT data FROM assets WHERE rowid = 1", [], |row| {
        row.get(0)
    })?;
    assert_eq!(data, vec![0x89, 0x50, 0x4e, 0x47]);
    Ok(())
}

#[test]
fn update_keeps_blobs_stored_in_untyped_columns() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE t (name TEXT, data);
         INSERT INTO t VALUES ('a', x'deadbeef');
         INSERT INTO t VALUES ('c', 'plain');",
    )?;
    let page = db.table_page("t")?;
    assert_eq!(page.rows[0].cells[1], Cell::Blob(vec![0xde, 0xad, 0xbe, 0xef]));

    db.update_row("t", 1, &fields(&[("table", "t"), ("rowid", "1"), ("name", "b"), ("data", "BLOB")]))?;
    db.update_row("t", 2, &fields(&[("table", "t"), ("rowid", "2"), ("data", "edited")]))?;

    let conn = rusqlite::Connection::open(db.path())?;
    let (name, data): (String, Vec<u8>) =
        conn.query_row("SELECT name, data FROM t WHERE rowid = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    assert_eq!(name, "b");
    assert_eq!(data, vec![0xde, 0xad, 0xbe, 0xef]);
    let edited: String = conn.query_row("SELECT data FROM t WHERE rowid = 2", [], |row| row.get(0))?;
    assert_eq!(edited, "edited");
    Ok(())
}

#[test]
fn sort_by_blob_column_uses_stored_bytes() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE f (n TEXT, b BLOB);
         INSERT INTO f VALUES ('one', x'01');
         INSERT INTO f VALUES ('two', x'02');
         INSERT INTO f VALUES ('zero', x'00');",
    )?;
    let page = db.sorted_page("f", "b")?;
    let rowids: Vec<_> = page.rows.iter().map(|row| row.rowid).collect();
    assert_eq!(rowids, vec![Some(3), Some(1), Some(2)]);
    assert!(page.rows.iter().all(|row| row.cells[1] == Cell::Text("BLOB".to_string())));
    Ok(())
}

#[test]
fn views_are_not_tables() -> TestResult<()> {
    let (_temp, db) = seeded(
        "CREATE TABLE t (a TEXT);
         CREATE VIEW v AS SELECT a FROM t;",
    )?;
    let err = match db.table_page("v") {
        Ok(_) => return Err("expected not found".into()),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = match db.delete_row("v", 1) {
        Ok(_) => return Err("expected not found".into()),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let page = db.view_page("v")?;
    assert_eq!(page.kind, PageKind::View);
    assert!(page.rows.is_empty());
    Ok(())
}

#[test]
fn not_null_violation_is_a_constraint_error() -> TestResult<()> {
    let (_temp, db) = seeded("CREATE TABLE accounts (email TEXT NOT NULL, note TEXT);")?;
    let err = match db.insert_row("accounts", &fields(&[("note", "no email")])) {
        Ok(_) => return Err("expected constraint error".into()),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::Constraint);
    Ok(())
}
