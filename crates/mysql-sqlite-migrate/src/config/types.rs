//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::TableFilter;
use crate::dialect::Collation;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL/MariaDB).
    pub source: SourceConfig,

    /// Destination configuration (SQLite).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Server host (default: "localhost").
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database to migrate.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Connection character set (default: "utf8mb4").
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Connection collation (default: "utf8mb4_unicode_ci").
    #[serde(default = "default_mysql_collation")]
    pub collation: String,

    /// Disable TLS for the source connection.
    #[serde(default)]
    pub ssl_disabled: bool,

    /// CA certificate for verifying the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_ca: Option<PathBuf>,

    /// Client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<PathBuf>,

    /// Client private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<PathBuf>,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("charset", &self.charset)
            .field("collation", &self.collation)
            .field("ssl_disabled", &self.ssl_disabled)
            .field("ssl_ca", &self.ssl_ca)
            .field("ssl_cert", &self.ssl_cert)
            .field("ssl_key", &self.ssl_key)
            .finish()
    }
}

impl SourceConfig {
    /// Minimal configuration for `database` as `user` on localhost.
    pub fn new(database: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: default_mysql_port(),
            database: database.into(),
            user: user.into(),
            password: None,
            charset: default_charset(),
            collation: default_mysql_collation(),
            ssl_disabled: false,
            ssl_ca: None,
            ssl_cert: None,
            ssl_key: None,
        }
    }

    /// Collation to request on connect.
    ///
    /// MySQL 8's `utf8mb4_0900_ai_ci` is unknown to MariaDB and older
    /// servers, so it is requested as `utf8mb4_unicode_ci`.
    pub fn effective_collation(&self) -> &str {
        if self.collation.eq_ignore_ascii_case("utf8mb4_0900_ai_ci") {
            "utf8mb4_unicode_ci"
        } else {
            &self.collation
        }
    }
}

/// Destination (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Path of the SQLite file. Created if absent.
    pub sqlite_file: PathBuf,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Only migrate these tables and views.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Migrate everything except these tables and views.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Transfer at most this many rows per table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_rows: Option<u64>,

    /// Collating sequence for textual columns (default: BINARY).
    #[serde(default)]
    pub collation: Collation,

    /// Prefix every index name with its table name.
    #[serde(default)]
    pub prefix_indices: bool,

    /// Do not emit FOREIGN KEY clauses.
    #[serde(default)]
    pub without_foreign_keys: bool,

    /// Skip schema creation, transfer data only.
    #[serde(default)]
    pub without_tables: bool,

    /// Skip data transfer, create schema only.
    #[serde(default)]
    pub without_data: bool,

    /// Rows per chunk. Absent or 0 reads each table in one pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,

    /// Store JSON columns as TEXT even when SQLite has JSON support.
    #[serde(default)]
    pub json_as_text: bool,

    /// Run VACUUM once the migration finishes.
    #[serde(default)]
    pub vacuum: bool,

    /// Create views as SQLite views (default: true). When false, views are
    /// materialized as tables and their rows are copied.
    #[serde(default = "default_true")]
    pub views_as_views: bool,

    /// Create STRICT tables (SQLite >= 3.37.0).
    #[serde(default)]
    pub strict: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            limit_rows: None,
            collation: Collation::default(),
            prefix_indices: false,
            without_foreign_keys: false,
            without_tables: false,
            without_data: false,
            chunk_size: None,
            json_as_text: false,
            vacuum: false,
            views_as_views: true,
            strict: false,
        }
    }
}

impl MigrationConfig {
    /// Table filter built from the include/exclude lists.
    pub fn table_filter(&self) -> TableFilter {
        if !self.include_tables.is_empty() {
            TableFilter::Include(self.include_tables.clone())
        } else if !self.exclude_tables.is_empty() {
            TableFilter::Exclude(self.exclude_tables.clone())
        } else {
            TableFilter::All
        }
    }

    /// Whether FOREIGN KEY clauses are emitted. Any table filter disables
    /// them since referenced tables may not be migrated.
    pub fn create_foreign_keys(&self) -> bool {
        !self.without_foreign_keys && self.table_filter().is_all()
    }

    /// Chunk size with 0 normalized to `None`.
    pub fn effective_chunk_size(&self) -> Option<u64> {
        self.chunk_size.filter(|&n| n > 0)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

fn default_mysql_collation() -> String {
    "utf8mb4_unicode_ci".to_string()
}

fn default_true() -> bool {
    true
}
