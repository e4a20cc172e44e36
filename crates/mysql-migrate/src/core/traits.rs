//! Core traits at the driver seam.
//!
//! - [`SourceReader`]: catalog introspection and streaming reads
//! - [`TargetWriter`]: existence checks, DDL, and duplicate-tolerant inserts
//! - [`Connector`]: opens readers/writers per database and answers
//!   server-level questions (database existence, lookup queries)
//!
//! The orchestrator only ever talks to these traits, so the whole planning
//! and transfer pipeline can be driven by an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{Column, ForeignKeyEdge, Table};
use super::value::{Batch, SqlValue};

/// Options for streaming rows out of one table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Columns to read, in order. Their types drive value decoding.
    pub columns: Vec<Column>,
    /// Optional WHERE predicate, spliced verbatim.
    pub where_clause: Option<String>,
    /// Optional row cap.
    pub limit: Option<u64>,
    /// Maximum rows per batch.
    pub batch_size: usize,
    /// Batches buffered ahead of the writer.
    pub read_ahead: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            database: String::new(),
            table: String::new(),
            columns: Vec::new(),
            where_clause: None,
            limit: None,
            batch_size: 1000,
            read_ahead: 2,
        }
    }
}

/// Read catalog metadata and rows from one source database.
///
/// # Streaming
///
/// [`SourceReader::read_table`] returns a bounded channel receiver. The
/// reader spawns a task that pulls rows off a single streaming query and
/// pushes them in batches; a full channel suspends the query until the
/// writer catches up, so memory stays bounded by `read_ahead` batches.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List base tables of the database in catalog (name) order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Load columns and primary key for one table.
    ///
    /// Fails with `MigrateError::Schema` if the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<Table>;

    /// Foreign-key edges among the given tables. Edges with an endpoint
    /// outside `tables` are not returned.
    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKeyEdge>>;

    /// Start streaming rows from a table.
    ///
    /// Yields batches of at most `opts.batch_size` rows. The final batch has
    /// `is_last` set; an error ends the stream.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Write schema and data to one target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create `target_name` from the source table's columns, nullability and
    /// primary key. Foreign keys are never emitted.
    async fn create_table(&self, source: &Table, target_name: &str) -> Result<()>;

    /// Remove every row of a table.
    async fn truncate_table(&self, table: &str) -> Result<()>;

    /// Insert a batch, silently skipping rows that collide with a unique key.
    ///
    /// Returns the number of rows actually persisted. The batch commits on
    /// its own; a failure leaves earlier batches in place.
    async fn insert_ignore(&self, table: &str, columns: &[String], batch: Batch) -> Result<u64>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Rows returned by a lookup query.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    /// Result column names.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<Vec<SqlValue>>,
}

/// Opens per-database readers and writers.
///
/// Each call to [`Connector::source`] / [`Connector::target`] yields an
/// independent pool sized by `max_conns`, so workers never share a
/// connection.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a reader on a source database.
    async fn source(&self, database: &str, max_conns: usize) -> Result<Arc<dyn SourceReader>>;

    /// Open a writer on an existing target database.
    async fn target(&self, database: &str, max_conns: usize) -> Result<Arc<dyn TargetWriter>>;

    /// Whether a database exists on the target server.
    async fn target_database_exists(&self, database: &str) -> Result<bool>;

    /// Create a database on the target server.
    async fn create_target_database(&self, database: &str) -> Result<()>;

    /// Run a lookup query against a source database.
    async fn lookup(&self, database: &str, sql: &str) -> Result<LookupResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_options_default() {
        let opts = ReadOptions::default();
        assert_eq!(opts.batch_size, 1000);
        assert_eq!(opts.read_ahead, 2);
        assert!(opts.where_clause.is_none());
        assert!(opts.limit.is_none());
    }
}
