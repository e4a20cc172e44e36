//! # mysql-migrate
//!
//! MySQL to MySQL table migration library.
//!
//! Copies selected tables from one or many source databases into target
//! databases, with support for:
//!
//! - **Table selection** per database: all tables (minus excludes and
//!   date-suffixed tables) or an explicit list, with per-table where/limit
//! - **Foreign-key ordering**: parents are copied before children, and
//!   tables of the same depth run concurrently behind a barrier
//! - **Dynamic databases** expanded from a lookup query (`tenant_{id}`)
//! - **Streaming transfers** in bounded batches with duplicate-tolerant
//!   `INSERT IGNORE`
//! - **Dry runs** that plan everything without touching row data
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mysql_migrate::config::{ConnectionConfig, RunConfig, SOURCE_ENV_PREFIX, TARGET_ENV_PREFIX};
//! use mysql_migrate::{Confirmation, MysqlConnector, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_migrate::Result<()> {
//!     let config = RunConfig::load("migrate.yaml")?;
//!     let connector = MysqlConnector::new(
//!         ConnectionConfig::from_env(SOURCE_ENV_PREFIX)?,
//!         ConnectionConfig::from_env(TARGET_ENV_PREFIX)?,
//!     )?;
//!
//!     let report = Orchestrator::new(config, Arc::new(connector))
//!         .with_confirmation(Confirmation::AlwaysYes)
//!         .run()
//!         .await?;
//!     println!("Migrated {} rows", report.rows_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod replicate;
pub mod report;
pub mod transfer;

// Re-exports for convenient access
pub use config::{ConnectionConfig, DatabaseSpec, DynamicDatabaseRule, RunConfig};
pub use drivers::MysqlConnector;
pub use error::{MigrateError, Result};
pub use orchestrator::Orchestrator;
pub use plan::{MigrationPlan, TableSpec};
pub use replicate::Confirmation;
pub use report::{DatabaseFailure, GlobalReport, TransferResult};
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
