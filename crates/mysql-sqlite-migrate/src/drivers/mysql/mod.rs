//! MySQL/MariaDB source driver.
//!
//! Reads schema metadata from `information_schema` and `SHOW` statements and
//! streams row pages over a single reconnectable connection.

mod reader;

pub use reader::{connect_options, MysqlReader};
