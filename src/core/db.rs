// Shared database handle and the row operations exposed over HTTP.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, params_from_iter};
use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::page::{self, Page};
use crate::core::query::{self, Statement};
use crate::core::schema::{self, SchemaObject};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle to the single connection; one operation holds it at a time.
///
/// No isolation spans requests: two updates of the same row race and the
/// later one wins.
#[derive(Clone)]
pub struct Database {
    path: Arc<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens an existing database file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("database file not found: {}", path.display())));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|err| {
            Error::sqlite(err).with_message(format!("failed to open {}", path.display()))
        })?;
        Self::from_connection(path.to_path_buf(), conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(Error::sqlite)?;
        Self::from_connection(PathBuf::from(":memory:"), conn)
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Result<Self, Error> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(Error::sqlite)?;
        Ok(Self {
            path: Arc::new(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Runs arbitrary setup SQL; used to seed fixtures.
    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.lock()
            .execute_batch(sql)
            .map_err(|err| Error::sqlite(err).with_query(sql))
    }

    pub fn list_objects(&self) -> Result<Vec<SchemaObject>, Error> {
        schema::list_objects(&self.lock())
    }

    pub fn table_page(&self, table: &str) -> Result<Page, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        for column in schema.primary_key() {
            debug!(table = %schema.name, column = %column.name, "primary key column");
        }
        let statement = query::select_table(&schema);
        debug!(sql = %statement.sql, "table query");
        page::table_page(&conn, &schema, &statement)
    }

    pub fn sorted_page(&self, table: &str, column: &str) -> Result<Page, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        let statement = query::select_sorted(&schema, column)?;
        debug!(sql = %statement.sql, "sorted query");
        page::table_page(&conn, &schema, &statement)
    }

    pub fn view_page(&self, view: &str) -> Result<Page, Error> {
        let conn = self.lock();
        let name = schema::view_name(&conn, view)?;
        let statement = query::select_view(&name);
        debug!(sql = %statement.sql, "view query");
        page::view_page(&conn, &name, &statement)
    }

    /// Inserts a row from form fields; returns the table's catalog name.
    pub fn insert_row(&self, table: &str, fields: &[(String, String)]) -> Result<String, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        let statement = query::insert(&schema, fields)?;
        let affected = execute(&conn, &statement)?;
        info!(table = %schema.name, rowid = conn.last_insert_rowid(), affected, "row inserted");
        Ok(schema.name)
    }

    pub fn update_row(
        &self,
        table: &str,
        rowid: i64,
        fields: &[(String, String)],
    ) -> Result<String, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        match query::update(&schema, rowid, fields)? {
            Some(statement) => {
                let affected = execute(&conn, &statement)?;
                info!(table = %schema.name, rowid, affected, "row updated");
            }
            None => debug!(table = %schema.name, rowid, "update has no editable columns"),
        }
        Ok(schema.name)
    }

    pub fn delete_row(&self, table: &str, rowid: i64) -> Result<String, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        let affected = execute(&conn, &query::delete(&schema, rowid))?;
        info!(table = %schema.name, rowid, affected, "row deleted");
        Ok(schema.name)
    }

    pub fn duplicate_row(&self, table: &str, rowid: i64) -> Result<String, Error> {
        let conn = self.lock();
        let schema = schema::table_schema(&conn, table)?;
        let affected = execute(&conn, &query::duplicate(&schema, rowid))?;
        info!(table = %schema.name, rowid, affected, "row duplicated");
        Ok(schema.name)
    }
}

fn execute(conn: &Connection, statement: &Statement) -> Result<usize, Error> {
    debug!(sql = %statement.sql, params = statement.params.len(), "execute");
    conn.execute(&statement.sql, params_from_iter(statement.params.iter()))
        .map_err(|err| Error::sqlite(err).with_query(statement.sql.clone()))
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::core::error::ErrorKind;

    #[test]
    fn open_rejects_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("missing.db");
        let err = match Database::open(&missing) {
            Ok(_) => panic!("expected missing file error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!missing.exists());
    }

    #[test]
    fn constraint_errors_carry_query() {
        let db = Database::open_in_memory().expect("db");
        db.execute_batch("CREATE TABLE tags (label TEXT NOT NULL UNIQUE); INSERT INTO tags VALUES ('x');")
            .expect("setup");
        let fields = vec![("label".to_string(), "x".to_string())];
        let err = db.insert_row("tags", &fields).expect_err("duplicate label");
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert!(err.query().is_some_and(|sql| sql.starts_with("INSERT INTO \"tags\"")));
    }
}
