//! # mysql-sqlite-migrate
//!
//! MySQL/MariaDB to SQLite migration library.
//!
//! This library copies a MySQL schema and its data into a SQLite file with
//! support for:
//!
//! - **Type translation** of MySQL column types, defaults, and collations
//!   into SQLite-legal DDL
//! - **Foreign key ordering** so parent tables are created first, with cycle
//!   detection
//! - **View transpilation** from MySQL to SQLite syntax
//! - **Chunked transfers** that survive a single lost source connection
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_sqlite_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_sqlite_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::connect(config).await?;
//!     let result = orchestrator.run(None).await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod ddl;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{SourceReader, SqlValue, Table, TableFilter};
pub use dialect::Collation;
pub use drivers::{MysqlReader, SqliteWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator};
pub use transfer::{TransferEngine, TransferStats};
