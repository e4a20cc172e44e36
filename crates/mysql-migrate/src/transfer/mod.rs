//! Streaming transfer of a single table.
//!
//! The source reader runs in its own task and hands batches over a bounded
//! channel; this side inserts them one at a time. Each batch commits on its
//! own, so a failure keeps everything written before it and stops the
//! table there.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::{ReadOptions, SourceReader, Table, TargetWriter};
use crate::error::MigrateError;
use crate::plan::TableSpec;
use crate::report::TransferResult;

/// Transfer engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Maximum rows per fetch/insert cycle.
    pub batch_size: usize,
    /// Batches buffered between reader and writer.
    pub read_ahead: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            read_ahead: 2,
        }
    }
}

/// Timing breakdown of one table copy.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Time spent waiting on the source.
    pub read_wait: Duration,
    /// Time spent in inserts.
    pub write_time: Duration,
    /// Non-empty batches inserted.
    pub batches: usize,
}

/// Copies tables batch by batch.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// Copy one table.
    ///
    /// Never fails as a whole: read and write errors are recorded in the
    /// returned [`TransferResult`] and end the table's transfer.
    pub async fn execute(
        &self,
        spec: &TableSpec,
        table: &Table,
        source: &dyn SourceReader,
        target: &dyn TargetWriter,
    ) -> TransferResult {
        let table_name = spec.source_full_name();
        let start = Instant::now();
        let columns = table.column_names();

        debug!(
            "Starting transfer {} -> {} (batch size {}, where: {}, limit: {})",
            table_name,
            spec.target_full_name(),
            self.config.batch_size,
            spec.where_clause.as_deref().unwrap_or("-"),
            spec.limit.map_or_else(|| "-".to_string(), |l| l.to_string()),
        );

        let mut rx = source.read_table(ReadOptions {
            database: spec.database.clone(),
            table: spec.name.clone(),
            columns: table.columns.clone(),
            where_clause: spec.where_clause.clone(),
            limit: spec.limit,
            batch_size: self.config.batch_size,
            read_ahead: self.config.read_ahead,
        });

        let mut stats = TransferStats::default();
        let mut read_count = 0u64;
        let mut written_count = 0u64;
        let mut failure: Option<MigrateError> = None;
        let mut finished = false;

        loop {
            let wait_start = Instant::now();
            let Some(next) = rx.recv().await else {
                break;
            };
            stats.read_wait += wait_start.elapsed();

            let batch = match next {
                Ok(batch) => batch,
                Err(e) => {
                    failure = Some(MigrateError::transfer(
                        &table_name,
                        format!("read failed after {} rows: {}", read_count, e),
                    ));
                    break;
                }
            };

            let is_last = batch.is_last;
            let batch_len = batch.len() as u64;

            if batch_len > 0 {
                read_count += batch_len;
                let write_start = Instant::now();
                match target.insert_ignore(&spec.target_name, &columns, batch).await {
                    Ok(affected) => {
                        // affected rows never exceed the batch
                        written_count += affected.min(batch_len);
                        stats.batches += 1;
                        stats.write_time += write_start.elapsed();
                    }
                    Err(e) => {
                        failure = Some(MigrateError::transfer(
                            &table_name,
                            format!("insert failed after {} rows written: {}", written_count, e),
                        ));
                        break;
                    }
                }
            }

            if is_last {
                finished = true;
                break;
            }
        }

        // Dropping the receiver stops the reader task at its next send
        drop(rx);

        if failure.is_none() && !finished {
            failure = Some(MigrateError::transfer(
                &table_name,
                "source stream ended before the last batch",
            ));
        }

        let duration = start.elapsed();
        let result = TransferResult::new(spec, read_count, written_count, duration, failure.as_ref());

        match &failure {
            Some(e) => error!("{}: {}", table_name, e),
            None => {
                if result.skipped_count() > 0 {
                    warn!(
                        "{}: {} duplicate row(s) skipped by target",
                        table_name,
                        result.skipped_count()
                    );
                }
                info!(
                    "{}: {} rows read, {} written in {:.2}s ({:.0} rows/s)",
                    table_name,
                    read_count,
                    written_count,
                    duration.as_secs_f64(),
                    result.rows_per_second()
                );
            }
        }
        debug!(
            "{}: {} batches, read wait {:?}, write {:?}",
            table_name, stats.batches, stats.read_wait, stats.write_time
        );

        result
    }
}
