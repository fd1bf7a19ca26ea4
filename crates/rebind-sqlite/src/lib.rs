//! rebind-sqlite - SQLite backends for rebind.
//!
//! - [`SqliteSource`] reads a SQLite database as a [`rebind_core::DataSource`]:
//!   tables become model kinds and declared foreign keys become relation
//!   fields.
//! - [`SqliteRemapStore`] persists a [`rebind_core::RemapTable`] so minted
//!   identifiers stay stable across processes.

mod remap_store;
mod schema;
mod source;

pub use remap_store::{SqliteRemapStore, StoredLink};
pub use source::{SqliteSource, DEFAULT_TRANSIENT_PREFIX};

use rebind_core::RebindError;

/// Map a rusqlite error into the library error type.
pub(crate) fn db_error(e: rusqlite::Error) -> RebindError {
    RebindError::database_with_source(e.to_string(), e)
}

/// Quote an SQL identifier.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
