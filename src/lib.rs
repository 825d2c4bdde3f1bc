//! Purpose: Library crate behind the `krd` SQLite browser binary.
//! Exports: `core` (database handle, schema lookups, statements, pages, errors), `html`.
//! Role: Everything that does not touch HTTP; the binary owns routing and shutdown.
//! Invariants: Identifiers are resolved against the live schema before use in SQL.
//! Invariants: Submitted values are bound as statement parameters, never spliced.
pub mod core;
pub mod html;
