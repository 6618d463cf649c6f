//! SQLite destination writer.
//!
//! Owns the single connection to the destination file. All DDL and row
//! inserts of a run go through it, one statement or one chunk transaction at
//! a time.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection};
use sqlx::{Arguments, Connection, Executor};
use tracing::{debug, info};

use crate::core::identifier::{quote_sqlite, quote_sqlite_list};
use crate::core::SqlValue;
use crate::error::{MigrateError, Result};

/// A `major.minor.patch` SQLite library version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SqliteVersion(pub u32, pub u32, pub u32);

impl SqliteVersion {
    /// First version accepting `TRUE`/`FALSE` literals.
    pub const BOOLEAN_LITERALS: SqliteVersion = SqliteVersion(3, 23, 0);
    /// First version with `STRICT` tables.
    pub const STRICT_TABLES: SqliteVersion = SqliteVersion(3, 37, 0);
    /// First version with JSON functions built in by default.
    pub const BUILTIN_JSON: SqliteVersion = SqliteVersion(3, 38, 0);
}

impl FromStr for SqliteVersion {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.').map(|p| p.parse::<u32>());
        let mut next = || -> Result<u32> {
            match parts.next() {
                Some(Ok(n)) => Ok(n),
                None => Ok(0),
                Some(Err(_)) => Err(MigrateError::Config(format!(
                    "unrecognized SQLite version '{}'",
                    s
                ))),
            }
        };
        Ok(SqliteVersion(next()?, next()?, next()?))
    }
}

impl std::fmt::Display for SqliteVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// What the linked SQLite library can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteCapabilities {
    pub version: SqliteVersion,
    /// JSON functions are available.
    pub json1: bool,
}

impl SqliteCapabilities {
    /// Derive capabilities from `sqlite_version()` and `PRAGMA compile_options`.
    pub fn detect(version: SqliteVersion, compile_options: &[String]) -> Self {
        let has = |opt: &str| compile_options.iter().any(|o| o.eq_ignore_ascii_case(opt));
        let json1 = has("ENABLE_JSON1")
            || (version >= SqliteVersion::BUILTIN_JSON && !has("OMIT_JSON"));
        Self { version, json1 }
    }

    pub fn supports_strict(&self) -> bool {
        self.version >= SqliteVersion::STRICT_TABLES
    }

    pub fn supports_boolean_literals(&self) -> bool {
        self.version >= SqliteVersion::BOOLEAN_LITERALS
    }
}

/// `INSERT OR IGNORE` statement with one placeholder per column.
pub fn insert_statement<S: AsRef<str>>(table: &str, columns: &[S]) -> Result<String> {
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_sqlite(table)?,
        quote_sqlite_list(columns)?,
        placeholders
    ))
}

fn bind_value(args: &mut SqliteArguments<'_>, value: SqlValue) -> std::result::Result<(), sqlx::error::BoxDynError> {
    match value {
        SqlValue::Null => args.add(Option::<i64>::None),
        SqlValue::Integer(v) => args.add(v),
        SqlValue::Real(v) => args.add(v),
        SqlValue::Text(v) => args.add(v),
        SqlValue::Blob(v) => args.add(v),
    }
}

/// Writer for the destination SQLite file.
pub struct SqliteWriter {
    conn: SqliteConnection,
    capabilities: SqliteCapabilities,
}

impl SqliteWriter {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(false);
        let writer = Self::connect(options, &path.display().to_string()).await?;
        info!(
            "Opened SQLite database {} (SQLite {})",
            path.display(),
            writer.capabilities.version
        );
        Ok(writer)
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MigrateError::target(e, "parsing in-memory SQLite URL"))?;
        Self::connect(options, ":memory:").await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self> {
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| MigrateError::target(e, format!("opening {}", label)))?;

        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| MigrateError::target(e, "reading SQLite version"))?;
        let compile_options: Vec<String> = sqlx::query_scalar("PRAGMA compile_options")
            .fetch_all(&mut conn)
            .await
            .map_err(|e| MigrateError::target(e, "reading SQLite compile options"))?;

        let capabilities = SqliteCapabilities::detect(version.parse()?, &compile_options);
        debug!("SQLite capabilities: {:?}", capabilities);
        Ok(Self { conn, capabilities })
    }

    pub fn capabilities(&self) -> &SqliteCapabilities {
        &self.capabilities
    }

    /// Run one statement outside any explicit transaction.
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute(sql)
            .await
            .map_err(|e| MigrateError::target(e, format!("executing {}", first_line(sql))))?;
        Ok(())
    }

    /// Run several statements in one transaction.
    pub async fn execute_script<'a, I>(&mut self, statements: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| MigrateError::target(e, "starting transaction"))?;
        for sql in statements {
            (&mut *tx)
                .execute(sql)
                .await
                .map_err(|e| MigrateError::target(e, format!("executing {}", first_line(sql))))?;
        }
        tx.commit()
            .await
            .map_err(|e| MigrateError::target(e, "committing schema"))?;
        Ok(())
    }

    /// Insert `rows` with `sql` in one transaction. Returns rows inserted,
    /// which is less than `rows.len()` when conflicts were ignored.
    pub async fn insert_chunk(&mut self, sql: &str, rows: Vec<Vec<SqlValue>>) -> Result<u64> {
        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| MigrateError::target(e, "starting chunk transaction"))?;

        let mut inserted = 0;
        for row in rows {
            let mut args = SqliteArguments::default();
            for value in row {
                bind_value(&mut args, value).map_err(|e| {
                    MigrateError::target(sqlx::Error::Encode(e), "binding row value")
                })?;
            }
            let result = sqlx::query_with(sql, args)
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::target(e, "inserting rows"))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::target(e, "committing chunk"))?;
        Ok(inserted)
    }

    /// Toggle `PRAGMA foreign_keys`.
    pub async fn set_foreign_keys(&mut self, enabled: bool) -> Result<()> {
        let sql = if enabled {
            "PRAGMA foreign_keys=ON"
        } else {
            "PRAGMA foreign_keys=OFF"
        };
        self.execute(sql).await
    }

    pub async fn foreign_keys_enabled(&mut self) -> Result<bool> {
        let on: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MigrateError::target(e, "reading PRAGMA foreign_keys"))?;
        Ok(on != 0)
    }

    /// Compact the database file.
    pub async fn vacuum(&mut self) -> Result<()> {
        self.execute("VACUUM").await
    }

    /// Number of rows in `table`.
    pub async fn row_count(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_sqlite(table)?);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MigrateError::target(e, format!("counting rows of {}", table)))?;
        Ok(count as u64)
    }

    /// Direct access to the connection.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MigrateError::target(e, "closing SQLite database"))
    }
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or_default()
}
