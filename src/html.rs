//! Purpose: Render object listings, row pages, and error bodies as HTML.
//! Exports: `route_path`, `index_fragment`, `page_html`, `error_html`.
//! Role: Row renderer back end; pure string building over `core::page::Page`.
//! Invariants: Every database-derived string is escaped; path segments are percent-encoded.
//! Invariants: Table pages post edits to `/u` and additions to `/a` with a hidden `table` field.
use htmlescape::encode_minimal;
use url::Url;

use crate::core::error::Error;
use crate::core::page::{Page, PageKind, Row};
use crate::core::schema::{ObjectKind, SchemaObject};
use crate::core::value::Cell;

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 1.5em; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 0.2em 0.4em; text-align: left; }
th a { text-decoration: none; }
td input { width: 100%; box-sizing: border-box; }
.blob { color: #888; font-style: italic; }
fieldset { margin-top: 1em; }
"#;

/// Builds an absolute path from raw segments, e.g. `["t", "my table"]` -> `/t/my%20table`.
pub fn route_path(segments: &[&str]) -> String {
    if segments.is_empty() {
        return String::from("/");
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(&encode_segment(segment));
    }
    out
}

fn encode_segment(segment: &str) -> String {
    // URL serialization collapses `.` and `..`, so those are escaped by hand.
    if segment == "." || segment == ".." {
        return segment.replace('.', "%2E");
    }
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return String::new();
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

/// Bare link fragments for `/`; not wrapped in the page layout.
pub fn index_fragment(objects: &[SchemaObject]) -> String {
    let mut out = String::new();
    for object in objects {
        let prefix = match object.kind {
            ObjectKind::Table => "t",
            ObjectKind::View => "v",
        };
        out.push_str(&format!(
            "<div><a href='{href}'>{name}</a></div>",
            href = encode_minimal(&route_path(&[prefix, &object.name])),
            name = encode_minimal(&object.name),
        ));
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<nav><a href=\"/\">tables</a></nav>\n{body}\n</body>\n</html>\n",
        title = encode_minimal(title),
    )
}

pub fn page_html(page: &Page) -> String {
    let mut body = format!("<h1>{}</h1>\n", encode_minimal(&page.name));
    match page.kind {
        PageKind::Table => table_body(page, &mut body),
        PageKind::View => view_body(page, &mut body),
    }
    layout(&page.name, &body)
}

fn view_body(page: &Page, out: &mut String) {
    out.push_str("<table>\n<thead><tr>");
    for name in page.column_names() {
        out.push_str(&format!("<th>{}</th>", encode_minimal(name)));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in &page.rows {
        out.push_str("<tr>");
        for cell in &row.cells {
            out.push_str(&format!("<td>{}</td>", encode_minimal(&cell.to_string())));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
}

fn table_body(page: &Page, out: &mut String) {
    let table = page.name.as_str();
    out.push_str("<table>\n<thead><tr>");
    out.push_str(&sort_header(table, "rowid"));
    for name in page.column_names() {
        out.push_str(&sort_header(table, name));
    }
    out.push_str("<th></th></tr></thead>\n<tbody>\n");

    let mut forms = String::new();
    for row in &page.rows {
        match row.rowid {
            Some(rowid) => {
                out.push_str(&editable_row(page, row, rowid));
                forms.push_str(&format!(
                    "<form id=\"row-{rowid}\" method=\"post\" action=\"/u\"><input type=\"hidden\" name=\"table\" value=\"{table}\"><input type=\"hidden\" name=\"rowid\" value=\"{rowid}\"></form>\n",
                    table = encode_minimal(table),
                ));
            }
            None => {
                out.push_str("<tr><td></td>");
                for cell in &row.cells {
                    out.push_str(&format!("<td>{}</td>", encode_minimal(&cell.to_string())));
                }
                out.push_str("<td></td></tr>\n");
            }
        }
    }
    out.push_str("</tbody>\n</table>\n");
    out.push_str(&forms);
    out.push_str(&add_form(page));
}

fn sort_header(table: &str, column: &str) -> String {
    format!(
        "<th><a href=\"{href}\">{name}</a></th>",
        href = encode_minimal(&route_path(&["s", table, column])),
        name = encode_minimal(column),
    )
}

fn editable_row(page: &Page, row: &Row, rowid: i64) -> String {
    let form = format!("row-{rowid}");
    let mut out = format!("<tr><td>{rowid}</td>");
    for (column, cell) in page.columns.iter().zip(&row.cells) {
        // Blob bytes can sit in columns not declared BLOB; the form only has the placeholder.
        if column.blob || matches!(cell, Cell::Blob(_)) {
            out.push_str(&format!(
                "<td class=\"blob\">{}</td>",
                encode_minimal(&cell.to_string())
            ));
            continue;
        }
        out.push_str(&format!(
            "<td><input form=\"{form}\" name=\"{name}\" value=\"{value}\"></td>",
            name = encode_minimal(&column.name),
            value = encode_minimal(&cell.to_string()),
        ));
    }
    let rowid_text = rowid.to_string();
    out.push_str(&format!(
        "<td><button form=\"{form}\">save</button> <a href=\"{dup}\">dup</a> <a href=\"{del}\">del</a></td></tr>\n",
        dup = encode_minimal(&route_path(&["dup", &page.name, &rowid_text])),
        del = encode_minimal(&route_path(&["d", &page.name, &rowid_text])),
    ));
    out
}

fn add_form(page: &Page) -> String {
    let mut out = format!(
        "<form id=\"add-row\" method=\"post\" action=\"/a\">\n<fieldset><legend>add row</legend>\n<input type=\"hidden\" name=\"table\" value=\"{}\">\n",
        encode_minimal(&page.name)
    );
    for column in page.columns.iter().filter(|c| !c.blob && !c.rowid_alias) {
        out.push_str(&format!(
            "<label>{label} <input name=\"{name}\"></label>\n",
            label = encode_minimal(&column.name),
            name = encode_minimal(&column.name),
        ));
    }
    out.push_str("<button>add</button>\n</fieldset>\n</form>\n");
    out
}

pub fn error_html(err: &Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        text.push_str(&format!("\ncaused by: {inner}"));
        source = inner.source();
    }
    format!("<pre>{}</pre>\n", encode_minimal(&text))
}
