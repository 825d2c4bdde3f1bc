// Per-request view model assembled from a result set.
use rusqlite::{Connection, params_from_iter};

use crate::core::error::{Error, ErrorKind};
use crate::core::query::Statement;
use crate::core::schema::TableSchema;
use crate::core::value::Cell;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageKind {
    Table,
    View,
}

/// Column header plus the flags that decide how its cells render.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageColumn {
    pub name: String,
    pub blob: bool,
    pub rowid_alias: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Present on table pages only.
    pub rowid: Option<i64>,
    pub cells: Vec<Cell>,
}

/// Rows of one table or view, ready for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub name: String,
    pub kind: PageKind,
    pub columns: Vec<PageColumn>,
    pub rows: Vec<Row>,
}

impl Page {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

fn run(conn: &Connection, statement: &Statement) -> Result<(Vec<String>, Vec<Vec<Cell>>), Error> {
    let query_error = |err: rusqlite::Error| Error::sqlite(err).with_query(statement.sql.clone());

    let mut stmt = conn.prepare(&statement.sql).map_err(query_error)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = names.len();

    let mut rows = stmt
        .query(params_from_iter(statement.params.iter()))
        .map_err(query_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(query_error)? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(Cell::from_ref(row.get_ref(idx).map_err(query_error)?));
        }
        out.push(cells);
    }
    Ok((names, out))
}

/// Runs a table select whose first result column is the rowid.
pub fn table_page(
    conn: &Connection,
    schema: &TableSchema,
    statement: &Statement,
) -> Result<Page, Error> {
    let (names, rows) = run(conn, statement)?;
    if names.len() != schema.columns.len() + 1 {
        return Err(Error::new(ErrorKind::Internal)
            .with_message(format!(
                "result has {} columns, schema of {} has {}",
                names.len().saturating_sub(1),
                schema.name,
                schema.columns.len()
            ))
            .with_query(statement.sql.clone()));
    }

    let alias = schema.rowid_alias().map(|column| column.cid);
    let columns = schema
        .columns
        .iter()
        .map(|column| PageColumn {
            name: column.name.clone(),
            blob: column.is_blob(),
            rowid_alias: Some(column.cid) == alias,
        })
        .collect();
    let rows = rows
        .into_iter()
        .map(|mut cells| {
            let rowid = cells.remove(0).as_integer();
            Row { rowid, cells }
        })
        .collect();

    Ok(Page {
        name: schema.name.clone(),
        kind: PageKind::Table,
        columns,
        rows,
    })
}

pub fn view_page(conn: &Connection, view: &str, statement: &Statement) -> Result<Page, Error> {
    let (names, rows) = run(conn, statement)?;
    let columns = names
        .into_iter()
        .map(|name| PageColumn {
            name,
            blob: false,
            rowid_alias: false,
        })
        .collect();
    let rows = rows
        .into_iter()
        .map(|cells| Row { rowid: None, cells })
        .collect();
    Ok(Page {
        name: view.to_string(),
        kind: PageKind::View,
        columns,
        rows,
    })
}
