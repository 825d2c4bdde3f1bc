// Statement construction from a resolved table schema and submitted form fields.
//
// Identifiers reach this module only after being resolved against the live
// schema, and are always quoted. Values are never spliced into SQL text.
use rusqlite::types::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{Column, TableSchema, unknown_column};
use crate::core::value::BLOB_PLACEHOLDER;

/// Form fields that address the target instead of naming a column.
pub const RESERVED_FIELDS: [&str; 2] = ["table", "rowid"];

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// `SELECT rowid, <cols> FROM <table>` with BLOB columns replaced by a placeholder.
pub fn select_table(schema: &TableSchema) -> Statement {
    let mut sql = String::from("SELECT rowid AS rowid");
    for column in &schema.columns {
        let ident = quote_ident(&column.name);
        if column.is_blob() {
            sql.push_str(&format!(", {} AS {ident}", quote_literal(BLOB_PLACEHOLDER)));
        } else {
            sql.push_str(&format!(", {ident}"));
        }
    }
    sql.push_str(&format!(" FROM {}", quote_ident(&schema.name)));
    Statement::new(sql)
}

pub fn select_view(view: &str) -> Statement {
    Statement::new(format!("SELECT * FROM {}", quote_ident(view)))
}

pub fn select_sorted(schema: &TableSchema, column: &str) -> Result<Statement, Error> {
    let column = schema.resolve_column(column)?;
    let mut statement = select_table(schema);
    // Qualified so a masked BLOB column sorts on its stored bytes, not the placeholder alias.
    statement.sql.push_str(&format!(
        " ORDER BY {}.{}",
        quote_ident(&schema.name),
        quote_ident(column)
    ));
    Ok(statement)
}

/// Submitted column fields, first value wins, reserved fields dropped.
fn column_fields<'a>(
    schema: &'a TableSchema,
    fields: &'a [(String, String)],
) -> Result<Vec<(&'a Column, &'a str)>, Error> {
    let mut out: Vec<(&Column, &str)> = Vec::new();
    for (name, value) in fields {
        if RESERVED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let column = schema
            .column(name)
            .ok_or_else(|| unknown_column(&schema.name, name))?;
        if out.iter().any(|(seen, _)| seen.cid == column.cid) {
            continue;
        }
        out.push((column, value.as_str()));
    }
    Ok(out)
}

pub fn insert(schema: &TableSchema, fields: &[(String, String)]) -> Result<Statement, Error> {
    let fields = column_fields(schema, fields)?;
    let table = quote_ident(&schema.name);
    if fields.is_empty() {
        return Ok(Statement::new(format!("INSERT INTO {table} DEFAULT VALUES")));
    }

    let mut statement = Statement::new(String::new());
    let mut names = Vec::with_capacity(fields.len());
    let mut slots = Vec::with_capacity(fields.len());
    for (column, value) in fields {
        names.push(quote_ident(&column.name));
        slots.push(statement.bind(Value::Text(value.to_string())));
    }
    statement.sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.join(", "),
        slots.join(", ")
    );
    Ok(statement)
}

/// Returns `None` when no editable column was submitted.
///
/// Declared BLOB columns are never assigned. Other columns keep a stored blob
/// value untouched, since the form only ever saw its placeholder.
pub fn update(
    schema: &TableSchema,
    rowid: i64,
    fields: &[(String, String)],
) -> Result<Option<Statement>, Error> {
    let fields = column_fields(schema, fields)?;
    let mut statement = Statement::new(String::new());
    let mut assignments = Vec::new();
    for (column, value) in fields {
        if column.is_blob() {
            continue;
        }
        let slot = statement.bind(Value::Text(value.to_string()));
        let ident = quote_ident(&column.name);
        assignments.push(format!(
            "{ident}=CASE WHEN typeof({ident})='blob' THEN {ident} ELSE {slot} END"
        ));
    }
    if assignments.is_empty() {
        return Ok(None);
    }
    let slot = statement.bind(Value::Integer(rowid));
    statement.sql = format!(
        "UPDATE {} SET {} WHERE rowid={slot}",
        quote_ident(&schema.name),
        assignments.join(", ")
    );
    Ok(Some(statement))
}

pub fn delete(schema: &TableSchema, rowid: i64) -> Statement {
    let mut statement = Statement::new(String::new());
    let slot = statement.bind(Value::Integer(rowid));
    statement.sql = format!("DELETE FROM {} WHERE rowid={slot}", quote_ident(&schema.name));
    statement
}

/// Copies one row, letting the engine assign the copy a fresh rowid.
pub fn duplicate(schema: &TableSchema, rowid: i64) -> Statement {
    let table = quote_ident(&schema.name);
    let alias = schema.rowid_alias().map(|column| column.cid);
    let copied: Vec<String> = schema
        .columns
        .iter()
        .filter(|column| Some(column.cid) != alias)
        .map(|column| quote_ident(&column.name))
        .collect();

    let (targets, sources) = match (copied.is_empty(), schema.rowid_alias()) {
        (true, Some(column)) => (quote_ident(&column.name), String::from("NULL")),
        _ => (copied.join(", "), copied.join(", ")),
    };

    let mut statement = Statement::new(String::new());
    let slot = statement.bind(Value::Integer(rowid));
    statement.sql =
        format!("INSERT INTO {table} ({targets}) SELECT {sources} FROM {table} WHERE rowid={slot}");
    statement
}

pub fn parse_rowid(raw: &str) -> Result<i64, Error> {
    raw.trim().parse::<i64>().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid rowid: {raw:?}"))
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{
        delete, duplicate, insert, parse_rowid, quote_ident, select_sorted, select_table,
        select_view, update,
    };
    use crate::core::error::ErrorKind;
    use crate::core::schema::{Column, TableSchema};
    use rusqlite::types::Value;

    fn column(cid: i64, name: &str, decl_type: &str, pk: i64) -> Column {
        Column {
            cid,
            name: name.to_string(),
            decl_type: decl_type.to_string(),
            not_null: false,
            default_value: None,
            pk,
        }
    }

    fn people() -> TableSchema {
        TableSchema {
            name: "people".to_string(),
            columns: vec![
                column(0, "id", "INTEGER", 1),
                column(1, "name", "TEXT", 0),
                column(2, "photo", "BLOB", 0),
            ],
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(select_view("my view").sql, "SELECT * FROM \"my view\"");
    }

    #[test]
    fn table_select_masks_blob_columns() {
        let statement = select_table(&people());
        assert_eq!(
            statement.sql,
            "SELECT rowid AS rowid, \"id\", \"name\", 'BLOB' AS \"photo\" FROM \"people\""
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn sort_requires_known_column() {
        let statement = select_sorted(&people(), "name").expect("sort");
        assert!(statement.sql.ends_with(" ORDER BY \"people\".\"name\""));
        let statement = select_sorted(&people(), "photo").expect("sort by blob");
        assert!(statement.sql.ends_with(" ORDER BY \"people\".\"photo\""));
        let err = select_sorted(&people(), "name; DROP TABLE people").expect_err("hostile");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn insert_binds_values_and_skips_reserved_fields() {
        let submitted = fields(&[
            ("table", "people"),
            ("rowid", "9"),
            ("name", "\"); DROP TABLE people; --"),
            ("name", "ignored"),
        ]);
        let statement = insert(&people(), &submitted).expect("insert");
        assert_eq!(statement.sql, "INSERT INTO \"people\" (\"name\") VALUES (?1)");
        assert_eq!(
            statement.params,
            vec![Value::Text("\"); DROP TABLE people; --".to_string())]
        );

        let statement = insert(&people(), &fields(&[("table", "people")])).expect("insert");
        assert_eq!(statement.sql, "INSERT INTO \"people\" DEFAULT VALUES");

        let err = insert(&people(), &fields(&[("nope", "1")])).expect_err("unknown column");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn update_skips_blob_columns() {
        let submitted = fields(&[("table", "people"), ("name", "Bob"), ("photo", "xyz")]);
        let statement = update(&people(), 3, &submitted)
            .expect("update")
            .expect("statement");
        assert_eq!(
            statement.sql,
            "UPDATE \"people\" SET \"name\"=CASE WHEN typeof(\"name\")='blob' THEN \"name\" ELSE ?1 END WHERE rowid=?2"
        );
        assert_eq!(
            statement.params,
            vec![Value::Text("Bob".to_string()), Value::Integer(3)]
        );

        let only_blob = fields(&[("photo", "xyz")]);
        assert!(update(&people(), 3, &only_blob).expect("update").is_none());
    }

    #[test]
    fn delete_and_duplicate_target_rowid() {
        let statement = delete(&people(), 5);
        assert_eq!(statement.sql, "DELETE FROM \"people\" WHERE rowid=?1");
        assert_eq!(statement.params, vec![Value::Integer(5)]);

        let statement = duplicate(&people(), 2);
        assert_eq!(
            statement.sql,
            "INSERT INTO \"people\" (\"name\", \"photo\") SELECT \"name\", \"photo\" FROM \"people\" WHERE rowid=?1"
        );

        let counter = TableSchema {
            name: "counter".to_string(),
            columns: vec![column(0, "id", "INTEGER", 1)],
        };
        assert_eq!(
            duplicate(&counter, 1).sql,
            "INSERT INTO \"counter\" (\"id\") SELECT NULL FROM \"counter\" WHERE rowid=?1"
        );
    }

    #[test]
    fn rowid_must_be_integer() {
        assert_eq!(parse_rowid(" 42 ").expect("rowid"), 42);
        let err = parse_rowid("1 OR 1=1").expect_err("bad rowid");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
