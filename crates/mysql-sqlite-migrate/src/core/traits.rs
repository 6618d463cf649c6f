//! Core traits at the seams of the migration engine.
//!
//! - [`SourceReader`]: introspects and reads a MySQL-family schema
//! - [`TypeMapper`]: maps source column types to SQLite types
//! - [`SqlRewriter`]: rewrites MySQL expression/type text into SQLite syntax
//!
//! # Design Patterns
//!
//! - **Strategy**: `TypeMapper` and `SqlRewriter` are interchangeable algorithms
//! - **Template Method**: `SourceReader::describe_table` assembles a descriptor
//!   from the individual metadata queries

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{Column, ForeignKey, Index, Table, TableKind, TableRef};
use super::value::SqlValue;

/// Which source tables a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TableFilter {
    /// Every table and view in the schema.
    #[default]
    All,
    /// Only the named tables.
    Include(Vec<String>),
    /// Everything except the named tables.
    Exclude(Vec<String>),
}

impl TableFilter {
    /// Whether `name` passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            TableFilter::All => true,
            TableFilter::Include(names) => names.iter().any(|n| n == name),
            TableFilter::Exclude(names) => !names.iter().any(|n| n == name),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TableFilter::All)
    }
}

/// One page of rows to pull from a source table.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Table name.
    pub table: String,
    /// Columns to read, in insert order. Types drive value decoding.
    pub columns: Vec<Column>,
    /// Columns to order by so pages are stable (usually the primary key).
    pub order_by: Vec<String>,
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return; `None` reads to the end.
    pub limit: Option<u64>,
}

/// Read schema metadata and rows from a MySQL-family source.
///
/// A reader owns exactly one connection. Any method may fail with
/// [`MigrateError::ConnectionLost`](crate::MigrateError::ConnectionLost); the
/// caller decides whether to [`reconnect`](SourceReader::reconnect) and retry.
#[async_trait]
pub trait SourceReader: Send {
    /// Name of the source database (schema).
    fn database(&self) -> &str;

    /// Enumerate tables and views, honoring the filter.
    async fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableRef>>;

    /// Load column metadata in ordinal order.
    async fn load_columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Load index metadata, including the primary key.
    async fn load_indexes(&mut self, table: &str) -> Result<Vec<Index>>;

    /// Load foreign keys, one entry per owning column.
    async fn load_foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>>;

    /// `(child, parent)` table pairs for every foreign key in the schema.
    async fn foreign_key_edges(&mut self) -> Result<Vec<(String, String)>>;

    /// Fetch the SELECT body of a view.
    async fn view_definition(&mut self, view: &str) -> Result<String>;

    /// Count rows, capped at `limit` when given.
    async fn count_rows(&mut self, table: &str, limit: Option<u64>) -> Result<u64>;

    /// Fetch one page of rows.
    async fn fetch_rows(&mut self, request: &FetchRequest) -> Result<Vec<Vec<SqlValue>>>;

    /// Drop the current connection and open a new one.
    async fn reconnect(&mut self) -> Result<()>;

    /// Whether the connection is currently usable.
    async fn is_connected(&mut self) -> bool;

    /// Build a full descriptor for a table or view.
    ///
    /// Views carry no indexes or foreign keys; their SELECT body is attached
    /// only when `with_view_body` is set.
    async fn describe_table(
        &mut self,
        table: &TableRef,
        with_foreign_keys: bool,
        with_view_body: bool,
    ) -> Result<Table> {
        let mut descriptor = Table::new(&table.name, table.kind);
        if table.kind == TableKind::View && with_view_body {
            descriptor.view_definition = Some(self.view_definition(&table.name).await?);
            return Ok(descriptor);
        }
        descriptor.columns = self.load_columns(&table.name).await?;
        if table.kind == TableKind::Table {
            descriptor.indexes = self.load_indexes(&table.name).await?;
            if with_foreign_keys {
                descriptor.foreign_keys = self.load_foreign_keys(&table.name).await?;
            }
        }
        Ok(descriptor)
    }
}

/// Result of mapping a source type to SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// SQLite type string (e.g., "VARCHAR(50)", "INTEGER").
    pub target_type: String,
    /// Whether this mapping loses type information.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}

/// Maps source column types to destination column types.
pub trait TypeMapper: Send + Sync {
    /// Map a full source type string such as `"int(11) unsigned"`.
    fn map_type(&self, column_type: &str) -> Result<TypeMapping>;
}

/// Rewrites MySQL SQL fragments into SQLite syntax.
///
/// Implementations never fail: `None` means "no opinion", letting a caller
/// fall back to another rewriter or to a safe default.
pub trait SqlRewriter: Send + Sync {
    /// Rewrite a scalar expression.
    fn rewrite(&self, expr: &str) -> Option<String>;

    /// Render `expr` as a SQLite literal if it is one, unwrapping a single
    /// layer of parentheses.
    fn literal(&self, expr: &str) -> Option<String>;

    /// Render a column type in canonical upper-case form.
    fn type_name(&self, column_type: &str) -> Option<String>;
}
