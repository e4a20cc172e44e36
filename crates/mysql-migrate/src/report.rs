//! Run results.
//!
//! [`TransferResult`]s are produced once per table and never changed.
//! [`GlobalReport`] only grows; workers append to it under a lock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{MigrateError, Result};
use crate::plan::{MigrationPlan, TableSpec};

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of copying one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferResult {
    pub database: String,
    pub table: String,
    pub target_database: String,
    pub target_table: String,

    /// Rows fetched from the source.
    pub read_count: u64,

    /// Rows the target actually persisted. Never above `read_count`.
    pub written_count: u64,

    #[serde(rename = "duration_seconds", serialize_with = "serialize_secs")]
    pub duration: Duration,

    /// First error hit; no batch was attempted after it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferResult {
    /// Result for a table that finished (or stopped) after the given counts.
    pub fn new(
        spec: &TableSpec,
        read_count: u64,
        written_count: u64,
        duration: Duration,
        error: Option<&MigrateError>,
    ) -> Self {
        Self {
            database: spec.database.clone(),
            table: spec.name.clone(),
            target_database: spec.target_database.clone(),
            target_table: spec.target_name.clone(),
            read_count,
            written_count,
            duration,
            error: error.map(ToString::to_string),
        }
    }

    /// Result for a table that failed before any row moved.
    pub fn failed(spec: &TableSpec, duration: Duration, error: &MigrateError) -> Self {
        Self::new(spec, 0, 0, duration, Some(error))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Rows dropped by the target as duplicates.
    pub fn skipped_count(&self) -> u64 {
        self.read_count.saturating_sub(self.written_count)
    }

    /// Rows per second over the table's transfer.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.written_count as f64 / secs
        } else {
            0.0
        }
    }
}

/// A failure that stopped a whole database (or a dynamic rule) from running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseFailure {
    /// Database name, or the rule pattern for lookup failures.
    pub database: String,
    pub kind: String,
    pub error: String,
}

impl DatabaseFailure {
    pub fn new(database: impl Into<String>, error: &MigrateError) -> Self {
        Self {
            database: database.into(),
            kind: error.kind().to_string(),
            error: error.to_string(),
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalReport {
    pub run_id: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Resolved plans, one per database that got far enough to be planned.
    pub plans: Vec<MigrationPlan>,
    pub results: Vec<TransferResult>,
    pub database_failures: Vec<DatabaseFailure>,
    pub warnings: Vec<String>,
}

impl GlobalReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            plans: Vec::new(),
            results: Vec::new(),
            database_failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record_plan(&mut self, plan: MigrationPlan) {
        if plan.unordered_fallback {
            self.warnings.push(format!(
                "{}: foreign-key cycle; fallback order used for {}",
                plan.database,
                plan.unordered_tables.join(", ")
            ));
        }
        self.plans.push(plan);
    }

    pub fn record_result(&mut self, result: TransferResult) {
        self.results.push(result);
    }

    pub fn record_failure(&mut self, failure: DatabaseFailure) {
        self.database_failures.push(failure);
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Stamp the finish time and put concurrently appended entries in a
    /// stable order (by database; per-table order within a database kept).
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.plans.sort_by(|a, b| a.database.cmp(&b.database));
        self.results.sort_by(|a, b| a.database.cmp(&b.database));
        self.database_failures
            .sort_by(|a, b| a.database.cmp(&b.database));
    }

    /// Success only if no table and no database failed.
    pub fn is_success(&self) -> bool {
        self.database_failures.is_empty() && self.results.iter().all(TransferResult::is_success)
    }

    pub fn plan_for(&self, database: &str) -> Option<&MigrationPlan> {
        self.plans.iter().find(|p| p.database == database)
    }

    pub fn rows_read(&self) -> u64 {
        self.results.iter().map(|r| r.read_count).sum()
    }

    pub fn rows_written(&self) -> u64 {
        self.results.iter().map(|r| r.written_count).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.results.iter().map(TransferResult::skipped_count).sum()
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &TransferResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn duration(&self) -> Duration {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
            .unwrap_or_default()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
