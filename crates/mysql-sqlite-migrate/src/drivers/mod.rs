//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB source reader implementing
//!   [`SourceReader`](crate::core::SourceReader)
//! - [`sqlite`]: SQLite destination writer with capability detection
//!
//! Each side owns exactly one connection; tables are copied sequentially.

pub mod mysql;
pub mod sqlite;

pub use mysql::MysqlReader;
pub use sqlite::{SqliteCapabilities, SqliteVersion, SqliteWriter};
