//! In-memory `SourceReader` for tests, scripted to lose its connection.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::schema::{Column, ForeignKey, Index, Table, TableKind, TableRef};
use crate::core::traits::{FetchRequest, SourceReader, TableFilter};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

struct MockTable {
    table: Table,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Default)]
pub(crate) struct MockSource {
    database: String,
    tables: Vec<MockTable>,
    views: HashMap<String, String>,
    edges_error: bool,
    connected: bool,
    /// `fetch_rows` calls that fail with a lost connection before one succeeds.
    pub fail_fetches: u32,
    /// `load_columns` calls that fail with a lost connection.
    pub fail_describes: u32,
    /// Make every `reconnect` fail.
    pub fail_reconnect: bool,
    pub reconnects: u32,
    /// Every page requested, as `(table, offset, limit)`.
    pub fetches: Vec<(String, u64, Option<u64>)>,
}

impl MockSource {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            connected: true,
            ..Default::default()
        }
    }

    pub fn with_table(mut self, table: Table, rows: Vec<Vec<SqlValue>>) -> Self {
        self.tables.push(MockTable { table, rows });
        self
    }

    /// Register a view; `columns` describe it when it is materialized.
    pub fn with_view(mut self, name: &str, columns: Vec<Column>, body: &str) -> Self {
        let mut table = Table::new(name, TableKind::View);
        table.columns = columns;
        self.views.insert(name.to_string(), body.to_string());
        self.tables.push(MockTable {
            table,
            rows: Vec::new(),
        });
        self
    }

    pub fn with_broken_edges(mut self) -> Self {
        self.edges_error = true;
        self
    }

    fn find(&self, name: &str) -> Result<&MockTable> {
        self.tables
            .iter()
            .find(|t| t.table.name == name)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no table {}", name)))
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(MigrateError::connection_lost("using mock", "not connected"))
        }
    }

    fn drop_connection(&mut self, context: &str) -> MigrateError {
        self.connected = false;
        MigrateError::connection_lost(context, "Lost connection to MySQL server during query")
    }
}

#[async_trait]
impl SourceReader for MockSource {
    fn database(&self) -> &str {
        &self.database
    }

    async fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableRef>> {
        self.check_connected()?;
        Ok(self
            .tables
            .iter()
            .filter(|t| filter.matches(&t.table.name))
            .map(|t| TableRef {
                name: t.table.name.clone(),
                kind: t.table.kind,
            })
            .collect())
    }

    async fn load_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        self.check_connected()?;
        if self.fail_describes > 0 {
            self.fail_describes -= 1;
            return Err(self.drop_connection("loading columns"));
        }
        Ok(self.find(table)?.table.columns.clone())
    }

    async fn load_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
        self.check_connected()?;
        Ok(self.find(table)?.table.indexes.clone())
    }

    async fn load_foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        self.check_connected()?;
        Ok(self.find(table)?.table.foreign_keys.clone())
    }

    async fn foreign_key_edges(&mut self) -> Result<Vec<(String, String)>> {
        self.check_connected()?;
        if self.edges_error {
            return Err(MigrateError::SchemaExtraction("edge query failed".into()));
        }
        Ok(self
            .tables
            .iter()
            .flat_map(|t| {
                t.table
                    .foreign_keys
                    .iter()
                    .map(|fk| (t.table.name.clone(), fk.ref_table.clone()))
            })
            .collect())
    }

    async fn view_definition(&mut self, view: &str) -> Result<String> {
        self.check_connected()?;
        self.views.get(view).cloned().ok_or_else(|| {
            MigrateError::SchemaExtraction(format!(
                "Unable to fetch definition for MySQL view '{}'",
                view
            ))
        })
    }

    async fn count_rows(&mut self, table: &str, limit: Option<u64>) -> Result<u64> {
        self.check_connected()?;
        let total = self.find(table)?.rows.len() as u64;
        Ok(limit.map_or(total, |l| total.min(l)))
    }

    async fn fetch_rows(&mut self, request: &FetchRequest) -> Result<Vec<Vec<SqlValue>>> {
        self.check_connected()?;
        self.fetches
            .push((request.table.clone(), request.offset, request.limit));
        if self.fail_fetches > 0 {
            self.fail_fetches -= 1;
            return Err(self.drop_connection("reading rows"));
        }
        let rows = &self.find(&request.table)?.rows;
        let start = (request.offset as usize).min(rows.len());
        let end = request
            .limit
            .map_or(rows.len(), |l| (start + l as usize).min(rows.len()));
        Ok(rows[start..end].to_vec())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects += 1;
        if self.fail_reconnect {
            return Err(MigrateError::connection_lost("reconnecting", "refused"));
        }
        self.connected = true;
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        self.connected
    }
}

/// `id int(11)` auto-increment primary key plus `name varchar(50)`.
pub(crate) fn id_name_table(name: &str) -> Table {
    let mut table = Table::new(name, TableKind::Table);
    table.columns = vec![
        Column {
            is_nullable: false,
            is_primary_key: true,
            is_auto_increment: true,
            ordinal_pos: 1,
            ..Column::new("id", "int(11)")
        },
        Column {
            ordinal_pos: 2,
            ..Column::new("name", "varchar(50)")
        },
    ];
    table.indexes = vec![Index {
        name: "PRIMARY".into(),
        columns: vec!["id".into()],
        is_unique: true,
        is_primary: true,
    }];
    table
}

/// Rows `(1, "row1")..=(n, "rown")` as the MySQL reader would produce them.
pub(crate) fn id_name_rows(n: i64) -> Vec<Vec<SqlValue>> {
    (1..=n)
        .map(|i| {
            vec![
                SqlValue::Integer(i),
                SqlValue::Blob(format!("row{}", i).into_bytes()),
            ]
        })
        .collect()
}
