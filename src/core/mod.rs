// Core modules: schema introspection, statement building, row pages, errors.
pub mod db;
pub mod error;
pub mod page;
pub mod query;
pub mod schema;
pub mod value;
