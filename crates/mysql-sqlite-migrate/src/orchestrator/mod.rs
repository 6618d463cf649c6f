//! Migration orchestrator - coordinates the MySQL to SQLite workflow.

mod deps;

pub use deps::{resolve_order, DependencyEdge, ResolvedOrder};

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, MigrationConfig};
use crate::core::schema::{Table, TableKind, TableRef};
use crate::core::traits::{SourceReader, TableFilter};
use crate::ddl::{IndexNameRegistry, SchemaBuilder, SchemaOptions};
use crate::drivers::mysql::MysqlReader;
use crate::drivers::sqlite::SqliteWriter;
use crate::error::{MigrateError, Result};
use crate::transfer::{
    RetryDecision, RetryPolicy, TransferCursorState, TransferEngine, TransferPlan,
};

/// Rows copied into one destination table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub name: String,
    pub kind: TableKind,
    /// Rows read from the source.
    pub rows: u64,
    /// Rows that were new to the destination.
    pub rows_inserted: u64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Source database name.
    pub database: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables created in SQLite.
    pub tables_created: usize,

    /// Views created in SQLite.
    pub views_created: usize,

    /// Total rows read from MySQL.
    pub rows_transferred: u64,

    /// Source reconnects performed.
    pub reconnects: u32,

    /// Foreign key edges left unordered because of cycles.
    pub cyclic_edges: Vec<DependencyEdge>,

    /// Per-table row counts, in processing order.
    pub tables: Vec<TableResult>,
}

impl MigrationResult {
    fn new(database: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            database: database.to_string(),
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            tables_created: 0,
            views_created: 0,
            rows_transferred: 0,
            reconnects: 0,
            cyclic_edges: Vec::new(),
            tables: Vec::new(),
        }
    }

    /// Convert result to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Migration orchestrator.
pub struct Orchestrator<S: SourceReader> {
    reader: S,
    writer: SqliteWriter,
    migration: MigrationConfig,
    builder: SchemaBuilder,
    registry: IndexNameRegistry,
    cursor: TransferCursorState,
}

impl Orchestrator<MysqlReader> {
    /// Connect to both databases described by `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let reader = MysqlReader::connect(&config.source).await?;
        let writer = SqliteWriter::open(&config.target.sqlite_file).await?;
        Ok(Self::new(reader, writer, config.migration))
    }
}

impl<S: SourceReader> Orchestrator<S> {
    /// Create an orchestrator over already-open connections.
    ///
    /// DDL options are fixed here from the destination's capabilities:
    /// `strict` is dropped on libraries older than 3.37.0 and JSON columns
    /// fall back to TEXT when JSON support is missing.
    pub fn new(reader: S, writer: SqliteWriter, migration: MigrationConfig) -> Self {
        let caps = writer.capabilities().clone();

        let mut strict = migration.strict;
        if strict && !caps.supports_strict() {
            warn!(
                "SQLite version {} does not support STRICT tables. Tables will be created without strict mode.",
                caps.version
            );
            strict = false;
        }

        let options = SchemaOptions {
            collation: migration.collation,
            prefix_indices: migration.prefix_indices,
            foreign_keys: migration.create_foreign_keys(),
            strict,
            boolean_literals: caps.supports_boolean_literals(),
            json1: caps.json1 && !migration.json_as_text,
        };
        let builder = SchemaBuilder::new(reader.database(), options);

        Self {
            reader,
            writer,
            migration,
            builder,
            registry: IndexNameRegistry::new(),
            cursor: TransferCursorState::default(),
        }
    }

    /// Options used for DDL generation after capability checks.
    pub fn schema_options(&self) -> &SchemaOptions {
        self.builder.options()
    }

    pub fn reader_mut(&mut self) -> &mut S {
        &mut self.reader
    }

    pub fn writer_mut(&mut self) -> &mut SqliteWriter {
        &mut self.writer
    }

    /// Run the migration.
    ///
    /// Foreign key enforcement is off for the duration of the run and is
    /// switched back on before returning, whether or not the run succeeded.
    pub async fn run(&mut self, cancel: Option<CancellationToken>) -> Result<MigrationResult> {
        let started = Instant::now();
        let mut result = MigrationResult::new(self.reader.database());
        info!("Starting migration run: {}", result.run_id);

        self.writer.set_foreign_keys(false).await?;
        let outcome = self.migrate(cancel.as_ref(), &mut result).await;
        let restored = self.writer.set_foreign_keys(true).await;
        outcome?;
        restored?;

        if self.migration.vacuum {
            info!("Vacuuming created SQLite database file.\nThis might take a while.");
            self.writer.vacuum().await?;
        }

        result.completed_at = Utc::now();
        result.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            "Migration completed: {} tables, {} views, {} rows in {:.1}s",
            result.tables_created,
            result.views_created,
            result.rows_transferred,
            result.duration_seconds
        );
        info!("Done!");
        Ok(result)
    }

    async fn migrate(
        &mut self,
        cancel: Option<&CancellationToken>,
        result: &mut MigrationResult,
    ) -> Result<()> {
        let filter = self.migration.table_filter();
        let tables = self.reader.list_tables(&filter).await?;
        let source_tables = self.source_table_names(&filter, &tables).await?;
        let ordered = self.creation_order(tables, result).await;

        for table in &ordered {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!("Cancellation requested, stopping before table {}", table.name);
                return Err(MigrateError::Cancelled);
            }
            self.process(table, &source_tables, cancel, result).await?;
        }
        Ok(())
    }

    /// Names of every table and view in the schema. SQLite keeps indexes in
    /// the same namespace, so an index named like either gets prefixed.
    async fn source_table_names(
        &mut self,
        filter: &TableFilter,
        listed: &[TableRef],
    ) -> Result<HashSet<String>> {
        let all = if filter.is_all() {
            listed.to_vec()
        } else {
            self.reader.list_tables(&TableFilter::All).await?
        };
        Ok(all.into_iter().map(|t| t.name).collect())
    }

    /// Parents before children; tables caught in cycles go last in
    /// enumeration order. Falls back to enumeration order when the foreign
    /// key graph cannot be read.
    async fn creation_order(
        &mut self,
        tables: Vec<TableRef>,
        result: &mut MigrationResult,
    ) -> Vec<TableRef> {
        let edges = match self.reader.foreign_key_edges().await {
            Ok(edges) => edges,
            Err(e) => {
                warn!(
                    "Failed to resolve table dependencies, using source order instead: {}",
                    e
                );
                return tables;
            }
        };

        let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        let resolved = resolve_order(&names, &edges);
        if resolved.has_cycles() {
            let described: Vec<String> = resolved
                .cyclic_edges
                .iter()
                .map(|(child, parent)| format!("{} -> {}", child, parent))
                .collect();
            warn!(
                "Circular foreign key dependencies detected: {}",
                described.join(", ")
            );
        }

        let mut ordered = Vec::with_capacity(tables.len());
        for name in &resolved.ordered {
            if let Some(t) = tables.iter().find(|t| &t.name == name) {
                ordered.push(t.clone());
            }
        }
        for t in &tables {
            if !resolved.ordered.contains(&t.name) {
                ordered.push(t.clone());
            }
        }
        result.cyclic_edges = resolved.cyclic_edges;
        ordered
    }

    async fn process(
        &mut self,
        table: &TableRef,
        source_tables: &HashSet<String>,
        cancel: Option<&CancellationToken>,
        result: &mut MigrationResult,
    ) -> Result<()> {
        let as_view = table.is_view() && self.migration.views_as_views;
        let copy_data = !self.migration.without_data && !as_view;

        if as_view {
            info!("Creating view {}", table.name);
        } else {
            let mode = if self.migration.without_data {
                "[WITHOUT DATA] "
            } else if self.migration.without_tables {
                "[ONLY DATA] "
            } else {
                ""
            };
            info!("{}Transferring table {}", mode, table.name);
        }

        let descriptor = if self.migration.without_tables {
            let mut policy = RetryPolicy::default();
            loop {
                match self.reader.describe_table(table, false, false).await {
                    Ok(d) => break d,
                    Err(e) => self.recover(&mut policy, e).await?,
                }
            }
        } else {
            let descriptor = self.create_with_retry(table, as_view, source_tables).await?;
            if as_view {
                result.views_created += 1;
            } else {
                result.tables_created += 1;
            }
            descriptor
        };

        if copy_data {
            self.transfer(&descriptor, cancel, result).await?;
        }
        Ok(())
    }

    /// Describe and create one table or view, reconnecting once if the
    /// source drops mid-way.
    async fn create_with_retry(
        &mut self,
        table: &TableRef,
        as_view: bool,
        source_tables: &HashSet<String>,
    ) -> Result<Table> {
        let mut policy = RetryPolicy::default();
        loop {
            match self.create(table, as_view, source_tables).await {
                Ok(descriptor) => return Ok(descriptor),
                Err(e) => self.recover(&mut policy, e).await?,
            }
        }
    }

    async fn create(
        &mut self,
        table: &TableRef,
        as_view: bool,
        source_tables: &HashSet<String>,
    ) -> Result<Table> {
        let with_fks = self.builder.options().foreign_keys;
        let descriptor = self.reader.describe_table(table, with_fks, as_view).await?;

        if as_view {
            let body = descriptor.view_definition.as_deref().unwrap_or_default();
            let sql = self.builder.build_view(&table.name, body)?;
            if let Err(e) = self.writer.execute(&sql).await {
                error!("SQLite failed creating view {}: {}", table.name, e);
                return Err(e);
            }
            return Ok(descriptor);
        }

        // Names are only committed to the registry once the DDL has run.
        let mut registry = self.registry.clone();
        let ddl = self.builder.build_table(&descriptor, source_tables, &mut registry)?;
        if let Err(e) = self.writer.execute_script(ddl.statements()).await {
            error!("SQLite failed creating table {}: {}", table.name, e);
            return Err(e);
        }
        self.registry = registry;
        Ok(descriptor)
    }

    async fn transfer(
        &mut self,
        descriptor: &Table,
        cancel: Option<&CancellationToken>,
        result: &mut MigrationResult,
    ) -> Result<()> {
        let mut policy = RetryPolicy::default();
        let total = loop {
            match self
                .reader
                .count_rows(&descriptor.name, self.migration.limit_rows)
                .await
            {
                Ok(n) => break n,
                Err(e) => self.recover(&mut policy, e).await?,
            }
        };

        let mut entry = TableResult {
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            rows: 0,
            rows_inserted: 0,
        };

        if total > 0 {
            let plan = TransferPlan::new(descriptor, total, self.migration.effective_chunk_size())?;
            self.cursor.reset();
            let mut engine = TransferEngine::new(RetryPolicy::default());
            let stats = engine
                .transfer(&mut self.reader, &mut self.writer, &plan, &mut self.cursor, cancel)
                .await?;
            info!(
                "{}: {} rows transferred ({} new)",
                descriptor.name, stats.rows_read, stats.rows_inserted
            );
            result.reconnects += stats.reconnects;
            entry.rows = stats.rows_read;
            entry.rows_inserted = stats.rows_inserted;
        }

        result.rows_transferred += entry.rows;
        result.reconnects += policy.reconnects();
        result.tables.push(entry);
        Ok(())
    }

    /// Reconnect once for a lost connection; any other error, or a second
    /// loss, is returned.
    async fn recover(&mut self, policy: &mut RetryPolicy, err: MigrateError) -> Result<()> {
        match policy.decide(&err) {
            RetryDecision::Reconnect => {
                warn!("Connection to MySQL server lost. Attempting to reconnect.");
                self.reader.reconnect().await.map_err(|e| {
                    error!("Reconnection attempt aborted.");
                    e
                })
            }
            RetryDecision::GiveUp => {
                if err.is_connection_lost() {
                    error!("Reconnection attempt aborted.");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, ForeignKey, Index};
    use crate::testing::{id_name_rows, id_name_table, MockSource};

    fn migration() -> MigrationConfig {
        MigrationConfig::default()
    }

    async fn orchestrator(source: MockSource, migration: MigrationConfig) -> Orchestrator<MockSource> {
        let writer = SqliteWriter::in_memory().await.unwrap();
        Orchestrator::new(source, writer, migration)
    }

    async fn sqlite_objects(orch: &mut Orchestrator<MockSource>, kind: &str) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .bind(kind)
        .fetch_all(orch.writer_mut().connection())
        .await
        .unwrap()
    }

    fn users_orders() -> MockSource {
        let mut orders = id_name_table("orders");
        orders.columns.push(Column {
            ordinal_pos: 3,
            ..Column::new("user_id", "int(11)")
        });
        orders.foreign_keys.push(ForeignKey {
            column: "user_id".into(),
            ref_table: "users".into(),
            ref_column: "id".into(),
            on_update: "CASCADE".into(),
            on_delete: "".into(),
        });
        let order_rows = (1..=4)
            .map(|i| {
                let mut row = id_name_rows(4).remove(i as usize - 1);
                row.push(crate::core::value::SqlValue::Integer(1));
                row
            })
            .collect();

        // Children listed first so ordering matters.
        MockSource::new("shop")
            .with_table(orders, order_rows)
            .with_table(id_name_table("users"), id_name_rows(3))
    }

    #[tokio::test]
    async fn test_end_to_end_creates_and_copies() {
        let mut orch = orchestrator(users_orders(), migration()).await;
        let result = orch.run(None).await.unwrap();

        assert_eq!(result.tables_created, 2);
        assert_eq!(result.rows_transferred, 7);
        assert!(result.cyclic_edges.is_empty());
        let order: Vec<&str> = result.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["users", "orders"]);

        assert_eq!(sqlite_objects(&mut orch, "table").await, vec!["orders", "users"]);
        assert_eq!(orch.writer_mut().row_count("users").await.unwrap(), 3);
        assert_eq!(orch.writer_mut().row_count("orders").await.unwrap(), 4);
        assert!(orch.writer_mut().foreign_keys_enabled().await.unwrap());

        let name: String = sqlx::query_scalar(r#"SELECT "name" FROM "users" WHERE "id" = 2"#)
            .fetch_one(orch.writer_mut().connection())
            .await
            .unwrap();
        assert_eq!(name, "row2");
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut orch = orchestrator(users_orders(), migration()).await;
        orch.run(None).await.unwrap();
        let second = orch.run(None).await.unwrap();

        assert_eq!(second.rows_transferred, 7);
        assert!(second.tables.iter().all(|t| t.rows_inserted == 0));
        assert_eq!(orch.writer_mut().row_count("users").await.unwrap(), 3);
        assert_eq!(orch.writer_mut().row_count("orders").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_three_chunks_with_one_reconnect() {
        let source = MockSource::new("shop").with_table(id_name_table("items"), id_name_rows(9));
        let mut config = migration();
        config.chunk_size = Some(3);
        let mut orch = orchestrator(source, config).await;
        orch.reader_mut().fail_fetches = 1;

        let result = orch.run(None).await.unwrap();

        assert_eq!(orch.reader_mut().reconnects, 1);
        assert_eq!(result.reconnects, 1);
        assert_eq!(orch.writer_mut().row_count("items").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_double_failure_is_fatal_and_restores_foreign_keys() {
        let source = MockSource::new("shop").with_table(id_name_table("items"), id_name_rows(9));
        let mut config = migration();
        config.chunk_size = Some(3);
        let mut orch = orchestrator(source, config).await;
        orch.reader_mut().fail_fetches = 2;

        let err = orch.run(None).await.unwrap_err();

        assert!(err.is_connection_lost());
        assert_eq!(orch.reader_mut().reconnects, 1);
        assert_eq!(orch.writer_mut().row_count("items").await.unwrap(), 0);
        assert!(orch.writer_mut().foreign_keys_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_lost_connection_during_create_is_retried() {
        let source = MockSource::new("shop").with_table(id_name_table("items"), id_name_rows(2));
        let mut orch = orchestrator(source, migration()).await;
        orch.reader_mut().fail_describes = 1;

        let result = orch.run(None).await.unwrap();
        assert_eq!(orch.reader_mut().reconnects, 1);
        assert_eq!(result.tables_created, 1);
        assert_eq!(orch.writer_mut().row_count("items").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_is_fatal() {
        let source = MockSource::new("shop").with_table(id_name_table("items"), id_name_rows(2));
        let mut orch = orchestrator(source, migration()).await;
        orch.reader_mut().fail_describes = 1;
        orch.reader_mut().fail_reconnect = true;

        assert!(orch.run(None).await.is_err());
        assert_eq!(orch.reader_mut().reconnects, 1);
        assert!(sqlite_objects(&mut orch, "table").await.is_empty());
    }

    #[tokio::test]
    async fn test_cycles_warn_and_still_migrate() {
        let mut a = id_name_table("a");
        a.foreign_keys.push(ForeignKey {
            column: "id".into(),
            ref_table: "b".into(),
            ref_column: "id".into(),
            on_update: "".into(),
            on_delete: "".into(),
        });
        let mut b = id_name_table("b");
        b.foreign_keys.push(ForeignKey {
            column: "id".into(),
            ref_table: "a".into(),
            ref_column: "id".into(),
            on_update: "".into(),
            on_delete: "".into(),
        });
        let source = MockSource::new("shop")
            .with_table(a, id_name_rows(1))
            .with_table(b, id_name_rows(1));
        let mut orch = orchestrator(source, migration()).await;

        let result = orch.run(None).await.unwrap();
        assert_eq!(result.cyclic_edges.len(), 2);
        assert_eq!(result.tables_created, 2);
    }

    #[tokio::test]
    async fn test_dependency_failure_falls_back_to_source_order() {
        let source = users_orders().with_broken_edges();
        let mut orch = orchestrator(source, migration()).await;

        let result = orch.run(None).await.unwrap();
        let order: Vec<&str> = result.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["orders", "users"]);
    }

    #[tokio::test]
    async fn test_views_and_materialized_views() {
        let columns = vec![Column::new("id", "int(11)"), Column::new("name", "varchar(50)")];
        let body = "select `shop`.`users`.`id` AS `id`,`shop`.`users`.`name` AS `name` from `shop`.`users`";

        let source = MockSource::new("shop")
            .with_table(id_name_table("users"), id_name_rows(2))
            .with_view("active_users", columns.clone(), body);
        let mut orch = orchestrator(source, migration()).await;
        let result = orch.run(None).await.unwrap();
        assert_eq!(result.views_created, 1);
        assert_eq!(sqlite_objects(&mut orch, "view").await, vec!["active_users"]);

        let source = MockSource::new("shop")
            .with_table(id_name_table("users"), id_name_rows(2))
            .with_view("active_users", columns, body);
        let mut config = migration();
        config.views_as_views = false;
        let mut orch = orchestrator(source, config).await;
        let result = orch.run(None).await.unwrap();
        assert_eq!(result.views_created, 0);
        assert_eq!(result.tables_created, 2);
        assert_eq!(sqlite_objects(&mut orch, "table").await, vec!["active_users", "users"]);
    }

    #[tokio::test]
    async fn test_index_named_like_view_is_prefixed() {
        let mut users = id_name_table("users");
        users.indexes.push(Index {
            name: "active_users".into(),
            columns: vec!["name".into()],
            is_unique: false,
            is_primary: false,
        });
        let columns = vec![Column::new("id", "int(11)"), Column::new("name", "varchar(50)")];
        let source = MockSource::new("shop")
            .with_table(users, id_name_rows(2))
            .with_view("active_users", columns, "select `id`,`name` from `users`");
        let mut orch = orchestrator(source, migration()).await;

        let result = orch.run(None).await.unwrap();
        assert_eq!(result.views_created, 1);
        assert_eq!(sqlite_objects(&mut orch, "index").await, vec!["users_active_users"]);
        assert_eq!(sqlite_objects(&mut orch, "view").await, vec!["active_users"]);
    }

    #[tokio::test]
    async fn test_without_data_and_only_data() {
        let mut config = migration();
        config.without_data = true;
        let mut orch = orchestrator(users_orders(), config).await;
        let result = orch.run(None).await.unwrap();
        assert_eq!(result.tables_created, 2);
        assert_eq!(result.rows_transferred, 0);
        assert_eq!(orch.writer_mut().row_count("users").await.unwrap(), 0);

        // Tables exist now; copy data only.
        orch.migration.without_data = false;
        orch.migration.without_tables = true;
        let result = orch.run(None).await.unwrap();
        assert_eq!(result.tables_created, 0);
        assert_eq!(result.rows_transferred, 7);
    }

    #[tokio::test]
    async fn test_limit_rows_and_filters() {
        let mut config = migration();
        config.limit_rows = Some(2);
        config.include_tables = vec!["users".into()];
        let mut orch = orchestrator(users_orders(), config).await;
        assert!(!orch.schema_options().foreign_keys);

        let result = orch.run(None).await.unwrap();
        assert_eq!(result.tables.len(), 1);
        assert_eq!(orch.writer_mut().row_count("users").await.unwrap(), 2);
        assert_eq!(sqlite_objects(&mut orch, "table").await, vec!["users"]);
    }

    #[tokio::test]
    async fn test_cancelled_run_restores_foreign_keys() {
        let mut orch = orchestrator(users_orders(), migration()).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = orch.run(Some(token)).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
        assert!(sqlite_objects(&mut orch, "table").await.is_empty());
        assert!(orch.writer_mut().foreign_keys_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_result_serializes() {
        let mut orch = orchestrator(users_orders(), migration()).await;
        let result = orch.run(None).await.unwrap();
        let json = result.to_json().unwrap();
        assert!(json.contains("\"rows_transferred\": 7"));
        assert!(json.contains("\"database\": \"shop\""));
    }
}
