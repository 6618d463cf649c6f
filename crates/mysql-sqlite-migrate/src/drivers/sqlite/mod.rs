//! SQLite destination driver.

mod writer;

pub use writer::{insert_statement, SqliteCapabilities, SqliteVersion, SqliteWriter};
