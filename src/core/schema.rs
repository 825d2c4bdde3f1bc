// Schema catalog lookups: object listing, column introspection, name allow-listing.
use rusqlite::{Connection, OptionalExtension, params};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    fn from_catalog(kind: &str) -> Option<Self> {
        match kind {
            "table" => Some(ObjectKind::Table),
            "view" => Some(ObjectKind::View),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    pub cid: i64,
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub pk: i64,
}

impl Column {
    pub fn is_blob(&self) -> bool {
        self.decl_type.eq_ignore_ascii_case("BLOB")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn is_blob(&self, name: &str) -> bool {
        self.column(name).is_some_and(Column::is_blob)
    }

    /// The `INTEGER PRIMARY KEY` column that aliases the rowid, if any.
    pub fn rowid_alias(&self) -> Option<&Column> {
        let mut pk_columns = self.columns.iter().filter(|column| column.pk > 0);
        let first = pk_columns.next()?;
        if pk_columns.next().is_some() {
            return None;
        }
        first.decl_type.eq_ignore_ascii_case("INTEGER").then_some(first)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.pk > 0)
    }

    /// Resolves a sort column; `rowid` is always accepted.
    pub fn resolve_column(&self, name: &str) -> Result<&str, Error> {
        if name.eq_ignore_ascii_case("rowid") {
            return Ok("rowid");
        }
        self.column(name)
            .map(|column| column.name.as_str())
            .ok_or_else(|| unknown_column(&self.name, name))
    }
}

pub fn unknown_column(table: &str, column: &str) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("no such column: {table}.{column}"))
}

/// Tables and views in catalog order; indexes and triggers are skipped.
pub fn list_objects(conn: &Connection) -> Result<Vec<SchemaObject>, Error> {
    let sql = "SELECT type, name FROM sqlite_schema WHERE type IN ('table', 'view')";
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| Error::sqlite(err).with_query(sql))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|err| Error::sqlite(err).with_query(sql))?;

    let mut objects = Vec::new();
    for row in rows {
        let (kind, name) = row.map_err(|err| Error::sqlite(err).with_query(sql))?;
        if let Some(kind) = ObjectKind::from_catalog(&kind) {
            objects.push(SchemaObject { kind, name });
        }
    }
    Ok(objects)
}

fn lookup(conn: &Connection, kind: ObjectKind, name: &str) -> Result<String, Error> {
    let sql = "SELECT name FROM sqlite_schema WHERE type = ?1 AND name = ?2 COLLATE NOCASE";
    let found = conn
        .query_row(sql, params![kind.as_str(), name], |row| row.get::<_, String>(0))
        .optional()
        .map_err(|err| Error::sqlite(err).with_query(sql))?;
    found.ok_or_else(|| {
        Error::new(ErrorKind::NotFound).with_message(format!("no such {}: {name}", kind.as_str()))
    })
}

/// Returns the catalog spelling of an existing view.
pub fn view_name(conn: &Connection, name: &str) -> Result<String, Error> {
    lookup(conn, ObjectKind::View, name)
}

/// Introspects an existing table's columns in declaration order.
pub fn table_schema(conn: &Connection, table: &str) -> Result<TableSchema, Error> {
    let name = lookup(conn, ObjectKind::Table, table)?;

    let sql = "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)";
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| Error::sqlite(err).with_query(sql))?;
    let rows = stmt
        .query_map(params![name], |row| {
            Ok(Column {
                cid: row.get(0)?,
                name: row.get(1)?,
                decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })
        .map_err(|err| Error::sqlite(err).with_query(sql))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|err| Error::sqlite(err).with_query(sql))?);
    }
    Ok(TableSchema { name, columns })
}
