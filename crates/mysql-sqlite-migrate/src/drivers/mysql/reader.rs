//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait over a single SQLx connection. The
//! connect options are kept so the connection can be re-established after
//! the server drops it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::mysql::{
    MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow, MySqlSslMode,
};
use sqlx::{Connection, Executor, Row};
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::{quote_mysql, quote_mysql_list};
use crate::core::schema::{Column, ForeignKey, Index, RawDefault, TableKind, TableRef};
use crate::core::traits::{FetchRequest, SourceReader, TableFilter};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// MySQL server error: unknown database.
const ER_BAD_DB_ERROR: u16 = 1049;
/// MySQL client error: server has gone away.
const CR_SERVER_GONE_ERROR: u16 = 2006;
/// MySQL client error: lost connection during query.
const CR_SERVER_LOST: u16 = 2013;

/// `EXTRA` markers meaning the column default is an expression rather than
/// a literal. MySQL 8.0.13+ reports `DEFAULT_GENERATED`.
const EXPRESSION_DEFAULT_MARKERS: &[&str] = &["DEFAULT_GENERATED"];

/// Body of `SHOW CREATE VIEW` output: everything after `VIEW <name> AS`.
static VIEW_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\bVIEW\s+(?:(?:`(?:[^`]|``)*`|[^\s.(`]+)\.)?(?:`(?:[^`]|``)*`|[^\s.(`]+)(?:\s*\([^)]*\))?\s+AS\s+(.*)$",
    )
    .unwrap()
});

/// Classify a driver error for `context`.
fn classify(err: sqlx::Error, context: &str, database: &str) -> MigrateError {
    let number = err
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(|e| e.number());

    let lost = matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed
    ) || matches!(number, Some(CR_SERVER_GONE_ERROR | CR_SERVER_LOST));

    if lost {
        MigrateError::connection_lost(context, err.to_string())
    } else if number == Some(ER_BAD_DB_ERROR) {
        error!("MySQL Database does not exist!");
        MigrateError::UnknownDatabase(database.to_string())
    } else {
        MigrateError::Source {
            context: context.to_string(),
            source: err,
        }
    }
}

/// Raw bytes of a cell; `None` for SQL NULL.
fn raw_bytes(row: &MySqlRow, index: usize) -> Option<Vec<u8>> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
}

fn text(row: &MySqlRow, index: usize) -> String {
    raw_bytes(row, index)
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

/// Join used against `KEY_COLUMN_USAGE` and `REFERENTIAL_CONSTRAINTS`.
/// MySQL after 8.0.19 needs an inner join; earlier MySQL and MariaDB keep
/// the left join.
fn foreign_key_join(version: &str) -> &'static str {
    if version.to_lowercase().contains("mariadb") {
        return "LEFT JOIN";
    }
    let mut parts = version
        .split(|c: char| !c.is_ascii_digit())
        .map(|p| p.parse::<u32>().ok());
    let major = parts.next().flatten();
    let minor = parts.next().flatten();
    let patch = parts.next().flatten();
    match (major, minor, patch) {
        (Some(8), Some(0), Some(patch)) if patch > 19 => "JOIN",
        (Some(8), Some(minor), _) if minor > 0 => "JOIN",
        (Some(major), _, _) if major > 8 => "JOIN",
        _ => "LEFT JOIN",
    }
}

/// Whether a lowercased base type is read back as an integer.
fn is_integer_column(base: &str) -> bool {
    matches!(
        base,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year"
    )
}

fn is_float_column(base: &str) -> bool {
    matches!(base, "float" | "double" | "real")
}

/// Decode one text-protocol cell using the column's source type.
fn decode_cell(row: &MySqlRow, index: usize, column: &Column) -> SqlValue {
    let Some(bytes) = raw_bytes(row, index) else {
        return SqlValue::Null;
    };
    let base = column.base_type();
    if is_integer_column(&base) {
        if let Some(v) = std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
            return SqlValue::Integer(v);
        }
    } else if is_float_column(&base) {
        if let Some(v) = std::str::from_utf8(&bytes).ok().and_then(|s| s.parse::<f64>().ok()) {
            return SqlValue::Real(v);
        }
    }
    SqlValue::Blob(bytes)
}

/// Build connect options from the source configuration.
pub fn connect_options(config: &SourceConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .charset(&config.charset)
        .collation(config.effective_collation());
    if let Some(password) = &config.password {
        options = options.password(password);
    }

    if config.ssl_disabled {
        return options.ssl_mode(MySqlSslMode::Disabled);
    }
    options = match &config.ssl_ca {
        Some(ca) => options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca),
        None => options.ssl_mode(MySqlSslMode::Preferred),
    };
    if let (Some(cert), Some(key)) = (&config.ssl_cert, &config.ssl_key) {
        options = options.ssl_client_cert(cert).ssl_client_key(key);
    }
    options
}

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    options: MySqlConnectOptions,
    database: String,
    conn: Option<MySqlConnection>,
    server_version: Option<String>,
}

impl MysqlReader {
    /// Connect using the source configuration.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = connect_options(config);
        let conn = Self::open(&options, &config.database).await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            options,
            database: config.database.clone(),
            conn: Some(conn),
            server_version: None,
        })
    }

    async fn open(options: &MySqlConnectOptions, database: &str) -> Result<MySqlConnection> {
        MySqlConnection::connect_with(options).await.map_err(|e| {
            let err = classify(e, "connecting to MySQL", database);
            if !matches!(err, MigrateError::UnknownDatabase(_)) {
                error!("{}", err);
            }
            err
        })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::connection_lost("using the MySQL connection", "not connected"))
    }

    /// `VERSION()` of the server, read once per reader.
    async fn server_version(&mut self) -> Result<String> {
        if let Some(version) = &self.server_version {
            return Ok(version.clone());
        }
        let rows = self
            .fetch_text("SELECT VERSION()", "reading MySQL server version")
            .await?;
        let version = rows.first().map(|row| text(row, 0)).unwrap_or_default();
        debug!("MySQL server version: {}", version);
        self.server_version = Some(version.clone());
        Ok(version)
    }

    /// Run a text-protocol query; every value comes back as bytes.
    async fn fetch_text(&mut self, sql: &str, context: &str) -> Result<Vec<MySqlRow>> {
        let database = self.database.clone();
        let conn = self.conn()?;
        conn.fetch_all(sql).await.map_err(|e| {
            let err = classify(e, context, &database);
            if err.is_connection_lost() {
                // The connection is unusable until reconnect().
                self.conn = None;
            }
            err
        })
    }

    /// Run a prepared query with the schema name bound first and `table`
    /// (when given) second.
    async fn fetch_bound(
        &mut self,
        sql: &str,
        table: Option<&str>,
        context: &str,
    ) -> Result<Vec<MySqlRow>> {
        let database = self.database.clone();
        let conn = self.conn()?;
        let mut query = sqlx::query(sql).bind(&database);
        if let Some(table) = table {
            query = query.bind(table);
        }
        let result = query.fetch_all(conn).await;
        result.map_err(|e| {
            let err = classify(e, context, &database);
            if err.is_connection_lost() {
                self.conn = None;
            }
            err
        })
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    fn database(&self) -> &str {
        &self.database
    }

    async fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableRef>> {
        let (names, negate) = match filter {
            TableFilter::All => (&[][..], false),
            TableFilter::Include(names) => (names.as_slice(), false),
            TableFilter::Exclude(names) => (names.as_slice(), true),
        };

        let mut sql = String::from(
            "SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME, \
                    CAST(TABLE_TYPE AS CHAR(64)) AS TABLE_TYPE \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ?",
        );
        if !names.is_empty() {
            sql.push_str(&format!(
                " AND TABLE_NAME {}IN ({})",
                if negate { "NOT " } else { "" },
                vec!["?"; names.len()].join(", ")
            ));
        }
        sql.push_str(" ORDER BY TABLE_NAME");

        let database = self.database.clone();
        let conn = self.conn()?;
        let mut query = sqlx::query(&sql).bind(&database);
        for name in names {
            query = query.bind(name);
        }
        let rows = match query.fetch_all(conn).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = classify(e, "listing MySQL tables", &database);
                if err.is_connection_lost() {
                    self.conn = None;
                }
                return Err(err);
            }
        };

        let tables: Vec<TableRef> = rows
            .iter()
            .map(|row| TableRef {
                name: text(row, 0),
                kind: TableKind::from_table_type(&text(row, 1)),
            })
            .collect();

        debug!("Found {} tables and views in {}", tables.len(), database);
        Ok(tables)
    }

    async fn load_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let sql = format!("SHOW COLUMNS FROM {}", quote_mysql(table)?);
        let rows = self.fetch_text(&sql, "loading MySQL columns").await?;

        let columns = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let column_type = text(row, 1);
                let extra = text(row, 5).to_uppercase();
                let mut column = Column::new(text(row, 0), column_type);
                column.is_nullable = text(row, 2).eq_ignore_ascii_case("YES");
                column.is_primary_key = text(row, 3).eq_ignore_ascii_case("PRI");
                column.is_auto_increment = extra.contains("AUTO_INCREMENT");
                column.default_is_expression =
                    EXPRESSION_DEFAULT_MARKERS.iter().any(|m| extra.contains(m));
                column.default = raw_bytes(row, 4).map(|bytes| {
                    if column.is_binary() {
                        RawDefault::Binary(bytes)
                    } else {
                        match String::from_utf8(bytes) {
                            Ok(s) => RawDefault::Text(s),
                            Err(e) => RawDefault::Binary(e.into_bytes()),
                        }
                    }
                });
                column.ordinal_pos = i as i32 + 1;
                column
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn load_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
        // CAST to CHAR so every field decodes as text
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(IF(NON_UNIQUE = 0, 1, 0) AS CHAR(1)) AS is_unique,
                CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) AS CHAR(4096)) AS columns
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
        "#;

        let rows = self
            .fetch_bound(query, Some(table), "loading MySQL indexes")
            .await?;

        let indexes: Vec<Index> = rows
            .iter()
            .map(|row| {
                let name = text(row, 0);
                let columns = text(row, 2)
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect();
                Index {
                    is_primary: name == "PRIMARY",
                    is_unique: text(row, 1) == "1",
                    name,
                    columns,
                }
            })
            .collect();

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn load_foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        let join = foreign_key_join(&self.server_version().await?);
        let query = format!(
            r#"
            SELECT
                CAST(k.COLUMN_NAME AS CHAR(255)) AS column_name,
                CAST(k.REFERENCED_TABLE_NAME AS CHAR(255)) AS ref_table,
                CAST(k.REFERENCED_COLUMN_NAME AS CHAR(255)) AS ref_column,
                CAST(c.UPDATE_RULE AS CHAR(64)) AS on_update,
                CAST(c.DELETE_RULE AS CHAR(64)) AS on_delete
            FROM information_schema.TABLE_CONSTRAINTS AS i
            {join} information_schema.KEY_COLUMN_USAGE AS k
                ON i.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
                AND i.CONSTRAINT_NAME = k.CONSTRAINT_NAME
                AND i.TABLE_NAME = k.TABLE_NAME
            {join} information_schema.REFERENTIAL_CONSTRAINTS AS c
                ON c.CONSTRAINT_SCHEMA = i.CONSTRAINT_SCHEMA
                AND c.CONSTRAINT_NAME = i.CONSTRAINT_NAME
                AND c.TABLE_NAME = i.TABLE_NAME
            WHERE i.TABLE_SCHEMA = ?
              AND i.TABLE_NAME = ?
              AND i.CONSTRAINT_TYPE = 'FOREIGN KEY'
            ORDER BY i.CONSTRAINT_NAME, k.ORDINAL_POSITION
        "#
        );

        let rows = self
            .fetch_bound(&query, Some(table), "loading MySQL foreign keys")
            .await?;

        let foreign_keys: Vec<ForeignKey> = rows
            .iter()
            .map(|row| ForeignKey {
                column: text(row, 0),
                ref_table: text(row, 1),
                ref_column: text(row, 2),
                on_update: text(row, 3),
                on_delete: text(row, 4),
            })
            .collect();

        debug!("Loaded {} foreign keys for {}", foreign_keys.len(), table);
        Ok(foreign_keys)
    }

    async fn foreign_key_edges(&mut self) -> Result<Vec<(String, String)>> {
        let query = r#"
            SELECT DISTINCT
                CAST(TABLE_NAME AS CHAR(255)) AS child,
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS parent
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_SCHEMA = TABLE_SCHEMA
              AND REFERENCED_TABLE_NAME IS NOT NULL
        "#;

        let rows = self
            .fetch_bound(query, None, "loading MySQL foreign key graph")
            .await?;
        Ok(rows.iter().map(|row| (text(row, 0), text(row, 1))).collect())
    }

    async fn view_definition(&mut self, view: &str) -> Result<String> {
        let query = r#"
            SELECT CAST(VIEW_DEFINITION AS CHAR) AS definition
            FROM information_schema.VIEWS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        match self
            .fetch_bound(query, Some(view), "reading MySQL view definition")
            .await
        {
            Ok(rows) => {
                if let Some(definition) = rows.first().map(|row| text(row, 0)) {
                    if !definition.trim().is_empty() {
                        return Ok(definition);
                    }
                }
            }
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => debug!("information_schema.VIEWS lookup failed for {}: {}", view, e),
        }

        let sql = format!("SHOW CREATE VIEW {}", quote_mysql(view)?);
        match self.fetch_text(&sql, "reading MySQL view definition").await {
            Ok(rows) => {
                if let Some(create) = rows.first().map(|row| text(row, 1)) {
                    if let Some(caps) = VIEW_BODY.captures(&create) {
                        let body = caps[1].trim().trim_end_matches(';').trim_end();
                        if !body.is_empty() {
                            return Ok(body.to_string());
                        }
                    }
                }
            }
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => debug!("SHOW CREATE VIEW failed for {}: {}", view, e),
        }

        Err(MigrateError::SchemaExtraction(format!(
            "Unable to fetch definition for MySQL view '{}'",
            view
        )))
    }

    async fn count_rows(&mut self, table: &str, limit: Option<u64>) -> Result<u64> {
        let quoted = quote_mysql(table)?;
        let sql = match limit {
            Some(n) => format!(
                "SELECT COUNT(*) AS `total_records` FROM (SELECT * FROM {} LIMIT {}) AS `table`",
                quoted, n
            ),
            None => format!("SELECT COUNT(*) AS `total_records` FROM {}", quoted),
        };
        let rows = self.fetch_text(&sql, "counting MySQL rows").await?;
        let count = rows
            .first()
            .map(|row| text(row, 0))
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(count)
    }

    async fn fetch_rows(&mut self, request: &FetchRequest) -> Result<Vec<Vec<SqlValue>>> {
        let names: Vec<&str> = request.columns.iter().map(|c| c.name.as_str()).collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            quote_mysql_list(&names)?,
            quote_mysql(&request.table)?
        );
        if !request.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", quote_mysql_list(&request.order_by)?));
        }
        match (request.limit, request.offset) {
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            // MySQL has no OFFSET without LIMIT
            (None, 0) => {}
            (None, offset) => sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {}", offset)),
        }

        let rows = self.fetch_text(&sql, "reading MySQL rows").await?;
        Ok(rows
            .iter()
            .map(|row| {
                request
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| decode_cell(row, i, column))
                    .collect()
            })
            .collect())
    }

    async fn reconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!("Closing stale MySQL connection failed: {}", e);
            }
        }
        warn!("Reconnecting to MySQL server");
        self.conn = Some(Self::open(&self.options, &self.database).await?);
        info!("Reconnected to MySQL server");
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.ping().await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_errors_are_connection_lost() {
        let err = sqlx::Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let classified = classify(err, "reading rows", "shop");
        assert!(classified.is_connection_lost());
        assert!(classified.to_string().contains("reading rows"));

        assert!(classify(sqlx::Error::PoolClosed, "x", "shop").is_connection_lost());
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let classified = classify(sqlx::Error::RowNotFound, "counting", "shop");
        assert!(matches!(classified, MigrateError::Source { .. }));
        assert_eq!(classified.exit_code(), 2);
    }

    #[test]
    fn test_connect_options_ssl_modes() {
        let mut config = SourceConfig::new("shop", "root");
        config.ssl_disabled = true;
        // Building options must not panic for any combination.
        let _ = connect_options(&config);

        config.ssl_disabled = false;
        config.ssl_ca = Some("/etc/ssl/ca.pem".into());
        config.ssl_cert = Some("/etc/ssl/client.pem".into());
        config.ssl_key = Some("/etc/ssl/client-key.pem".into());
        let _ = connect_options(&config);
    }

    #[test]
    fn test_view_body_regex() {
        let create = "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER \
                      VIEW `v` AS select `t`.`a` AS `a` from `t`";
        let caps = VIEW_BODY.captures(create).unwrap();
        assert_eq!(&caps[1], "select `t`.`a` AS `a` from `t`");
    }

    #[test]
    fn test_view_body_regex_skips_as_in_definer_and_name() {
        let create = "CREATE ALGORITHM=UNDEFINED DEFINER=`as`@`%` SQL SECURITY DEFINER \
                      VIEW `shop`.`as` AS select 1 AS `x`";
        let caps = VIEW_BODY.captures(create).unwrap();
        assert_eq!(&caps[1], "select 1 AS `x`");

        let create = "CREATE DEFINER=`a view b`@`%` VIEW `v` (`c`) AS select `t`.`c` from `t`";
        let caps = VIEW_BODY.captures(create).unwrap();
        assert_eq!(&caps[1], "select `t`.`c` from `t`");
    }

    #[test]
    fn test_foreign_key_join_by_server_version() {
        assert_eq!(foreign_key_join("8.0.19"), "LEFT JOIN");
        assert_eq!(foreign_key_join("8.0.20"), "JOIN");
        assert_eq!(foreign_key_join("8.0.36-0ubuntu0.22.04.1"), "JOIN");
        assert_eq!(foreign_key_join("8.4.0"), "JOIN");
        assert_eq!(foreign_key_join("9.1.0"), "JOIN");
        assert_eq!(foreign_key_join("5.7.44-log"), "LEFT JOIN");
        assert_eq!(foreign_key_join("10.11.6-MariaDB-1:10.11.6+maria~ubu2204"), "LEFT JOIN");
        assert_eq!(foreign_key_join(""), "LEFT JOIN");
    }

    #[test]
    fn test_column_kind_helpers() {
        assert!(is_integer_column("bigint"));
        assert!(is_integer_column("year"));
        assert!(!is_integer_column("decimal"));
        assert!(is_float_column("double"));
        assert!(!is_float_column("varchar"));
    }
}
