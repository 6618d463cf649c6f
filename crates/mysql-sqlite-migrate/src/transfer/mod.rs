//! Chunked row transfer from the MySQL source into SQLite.
//!
//! One table at a time, the engine pulls pages of rows, normalizes each cell
//! with [`encode_row`], and inserts the page with `INSERT OR IGNORE` in a
//! single transaction. The chunk counter in [`TransferCursorState`] only
//! advances after a commit, so a transfer that resumes after a reconnect
//! starts at the chunk that failed. A replayed chunk is harmless because
//! conflicting rows are ignored.

mod retry;

pub use retry::{RetryDecision, RetryPolicy};

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::schema::{Column, Table};
use crate::core::traits::{FetchRequest, SourceReader};
use crate::core::value::{encode_row, SqlValue};
use crate::drivers::sqlite::{insert_statement, SqliteWriter};
use crate::error::{MigrateError, Result};

/// Per-table transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    /// Reading and committing the given chunk.
    Streaming(u64),
    /// Reconnecting before retrying the given chunk.
    Reconnecting(u64),
    Committed,
    Failed,
}

/// Index of the next chunk to transfer. Reset per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferCursorState {
    pub next_chunk: u64,
}

impl TransferCursorState {
    pub fn reset(&mut self) {
        self.next_chunk = 0;
    }
}

/// Everything needed to copy one table.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub table: String,
    pub columns: Vec<Column>,
    /// Columns giving pages a stable order.
    pub order_by: Vec<String>,
    /// Parameterized `INSERT OR IGNORE` statement.
    pub insert_sql: String,
    /// Rows to copy, already capped by any row limit.
    pub total_rows: u64,
    /// Rows per chunk; `None` copies everything in one chunk.
    pub chunk_size: Option<u64>,
}

impl TransferPlan {
    pub fn new(table: &Table, total_rows: u64, chunk_size: Option<u64>) -> Result<Self> {
        let names = table.column_names();
        if names.is_empty() {
            return Err(MigrateError::transfer(&table.name, "table has no columns"));
        }
        Ok(Self {
            table: table.name.clone(),
            insert_sql: insert_statement(&table.name, &names)?,
            columns: table.columns.clone(),
            order_by: stable_order(table),
            total_rows,
            chunk_size: chunk_size.filter(|&c| c > 0),
        })
    }

    /// Number of chunks needed for `total_rows`.
    pub fn chunk_count(&self) -> u64 {
        if self.total_rows == 0 {
            return 0;
        }
        match self.chunk_size {
            Some(size) => self.total_rows.div_ceil(size),
            None => 1,
        }
    }

    /// Page request for chunk `index`.
    pub fn request(&self, index: u64) -> FetchRequest {
        let (offset, limit) = match self.chunk_size {
            Some(size) => {
                let offset = index * size;
                (offset, size.min(self.total_rows.saturating_sub(offset)))
            }
            None => (0, self.total_rows),
        };
        FetchRequest {
            table: self.table.clone(),
            columns: self.columns.clone(),
            order_by: self.order_by.clone(),
            offset,
            limit: Some(limit),
        }
    }
}

/// Primary key, else the first unique index, else every column.
fn stable_order(table: &Table) -> Vec<String> {
    let pk = table.primary_key();
    if !pk.is_empty() {
        return pk;
    }
    if let Some(unique) = table.indexes.iter().find(|i| i.is_unique) {
        return unique.columns.clone();
    }
    table.column_names()
}

/// Outcome of copying one table.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    pub rows_read: u64,
    /// Rows actually inserted; lower than `rows_read` when rows already existed.
    pub rows_inserted: u64,
    pub chunks: u64,
    pub reconnects: u32,
    pub read_time: Duration,
    pub write_time: Duration,
}

/// Drives the chunk loop for one table.
#[derive(Debug, Default)]
pub struct TransferEngine {
    policy: RetryPolicy,
    state: TransferState,
}

impl TransferEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: TransferState::Idle,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Copy the rows described by `plan`, starting at `cursor.next_chunk`.
    ///
    /// A lost source connection is retried once per call by reconnecting
    /// and re-reading the chunk that failed.
    pub async fn transfer<S>(
        &mut self,
        reader: &mut S,
        writer: &mut SqliteWriter,
        plan: &TransferPlan,
        cursor: &mut TransferCursorState,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransferStats>
    where
        S: SourceReader + ?Sized,
    {
        let chunks = plan.chunk_count();
        let mut stats = TransferStats::default();

        while cursor.next_chunk < chunks {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                self.state = TransferState::Failed;
                return Err(MigrateError::Cancelled);
            }

            let chunk = cursor.next_chunk;
            self.state = TransferState::Streaming(chunk);
            let request = plan.request(chunk);

            let started = Instant::now();
            let rows = match reader.fetch_rows(&request).await {
                Ok(rows) => rows,
                Err(e) => {
                    self.recover(reader, &plan.table, chunk, e).await?;
                    stats.reconnects = self.policy.reconnects();
                    continue;
                }
            };
            stats.read_time += started.elapsed();

            let read = rows.len() as u64;
            let encoded: Vec<Vec<SqlValue>> = rows.into_iter().map(encode_row).collect();

            let started = Instant::now();
            let inserted = match writer.insert_chunk(&plan.insert_sql, encoded).await {
                Ok(n) => n,
                Err(e) => {
                    error!("SQLite transfer failed inserting data into table {}", plan.table);
                    self.state = TransferState::Failed;
                    return Err(e);
                }
            };
            stats.write_time += started.elapsed();

            cursor.next_chunk += 1;
            stats.chunks += 1;
            stats.rows_read += read;
            stats.rows_inserted += inserted;
            debug!(
                "{}: chunk {}/{} committed ({} rows, {} inserted)",
                plan.table,
                chunk + 1,
                chunks,
                read,
                inserted
            );
        }

        self.state = TransferState::Committed;
        Ok(stats)
    }

    /// Reconnect after a failed read, or surface the error.
    async fn recover<S>(
        &mut self,
        reader: &mut S,
        table: &str,
        chunk: u64,
        err: MigrateError,
    ) -> Result<()>
    where
        S: SourceReader + ?Sized,
    {
        match self.policy.decide(&err) {
            RetryDecision::Reconnect => {
                warn!("Connection to MySQL server lost. Attempting to reconnect.");
                self.state = TransferState::Reconnecting(chunk);
                if let Err(e) = reader.reconnect().await {
                    error!("Reconnection attempt aborted.");
                    self.state = TransferState::Failed;
                    return Err(e);
                }
                Ok(())
            }
            RetryDecision::GiveUp => {
                if err.is_connection_lost() {
                    error!("Reconnection attempt aborted.");
                }
                error!("MySQL transfer failed reading table data from table {}", table);
                self.state = TransferState::Failed;
                Err(err)
            }
        }
    }
}
