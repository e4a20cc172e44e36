//! Migration orchestrator - main workflow coordinator.
//!
//! A run goes through three phases:
//!
//! 1. Expand dynamic rules into databases (lookup queries).
//! 2. Per database, under the `parallel_databases` pool: select tables,
//!    resolve foreign-key order, and record the plan.
//! 3. Per stratum, under the `parallel_tables` pool: prepare and copy every
//!    table, then wait for the whole stratum before starting the next.
//!
//! Only configuration errors end a run early. Anything scoped to a
//! database or a table is recorded in the [`GlobalReport`] and the run
//! carries on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::{DatabaseSpec, RunConfig};
use crate::core::{Connector, SourceReader, Table, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::plan::{
    build_plan, expand_rule, merge_databases, resolve, select_tables, MigrationPlan, PlanFlags,
    Resolution, SelectionInput, TableSpec,
};
use crate::replicate::{ensure_target_database, Confirmation, SchemaReplicator};
use crate::report::{DatabaseFailure, GlobalReport, TransferResult};
use crate::transfer::{TransferConfig, TransferEngine};

/// Migration orchestrator.
pub struct Orchestrator {
    config: RunConfig,
    connector: Arc<dyn Connector>,
    confirmation: Confirmation,
}

/// State shared by every database task of one run.
struct RunContext {
    config: RunConfig,
    connector: Arc<dyn Connector>,
    confirmation: Confirmation,
    report: Mutex<GlobalReport>,
}

/// A resolved plan plus the tables already described while planning.
struct PlannedDatabase {
    plan: MigrationPlan,
    described: HashMap<String, Table>,
}

impl Orchestrator {
    /// Create a new orchestrator. Missing target databases are not created
    /// unless a confirmation is supplied.
    pub fn new(config: RunConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            confirmation: Confirmation::AlwaysNo,
        }
    }

    /// Set how missing target databases are confirmed.
    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the migration.
    ///
    /// # Errors
    ///
    /// Only `MigrateError::Config`: invalid configuration, a lookup result
    /// that cannot be expanded, or conflicting generated targets. Every
    /// other failure is recorded in the returned report.
    pub async fn run(&self) -> Result<GlobalReport> {
        self.config.validate()?;

        let mut report = GlobalReport::new(self.config.dry_run);
        info!(
            "Starting migration run: {}{}",
            report.run_id,
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        // Phase 1: Expand dynamic databases
        let databases = self.expand_databases(&mut report).await?;
        info!(
            "Phase 1: {} database(s) to migrate ({} parallel, {} tables each)",
            databases.len(),
            self.config.parallel_databases(),
            self.config.parallel_tables()
        );

        let ctx = Arc::new(RunContext {
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            confirmation: self.confirmation.clone(),
            report: Mutex::new(report),
        });

        // Phase 2: Databases under the database pool
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_databases()));
        let mut handles = Vec::with_capacity(databases.len());

        for db in databases {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let name = db.name.clone();
            let ctx = Arc::clone(&ctx);

            let handle = tokio::spawn(async move {
                if let Err(e) = ctx.run_database(&db).await {
                    error!("{}: {}", db.name, e);
                    ctx.report
                        .lock()
                        .await
                        .record_failure(DatabaseFailure::new(&db.name, &e));
                }
                drop(permit);
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                error!("{}: task panicked - {}", name, e);
                ctx.report.lock().await.record_failure(DatabaseFailure {
                    database: name,
                    kind: "panic".to_string(),
                    error: format!("Task panicked: {}", e),
                });
            }
        }

        let mut report = ctx.report.lock().await.clone();
        report.finish();

        info!(
            "Run {} finished in {:.2}s: {} table(s), {} rows read, {} written, {} skipped, {} failure(s)",
            report.run_id,
            report.duration().as_secs_f64(),
            report.results.len(),
            report.rows_read(),
            report.rows_written(),
            report.rows_skipped(),
            report.failed_results().count() + report.database_failures.len()
        );
        Ok(report)
    }

    /// Run every lookup and merge generated databases into the static list.
    async fn expand_databases(&self, report: &mut GlobalReport) -> Result<Vec<DatabaseSpec>> {
        let mut generated = Vec::new();

        for rule in &self.config.dynamic_databases {
            let lookup = match self
                .connector
                .lookup(&rule.lookup_query.database, &rule.lookup_query.sql)
                .await
            {
                Ok(lookup) => lookup,
                Err(e) if e.is_config() => return Err(e),
                Err(e) => {
                    error!("{}: lookup failed - {}", rule.pattern, e);
                    report.record_failure(DatabaseFailure::new(&rule.pattern, &e));
                    continue;
                }
            };

            let specs = expand_rule(rule, &lookup)?;
            if specs.is_empty() {
                report.warn(format!("{}: lookup returned no databases", rule.pattern));
            } else {
                info!("{}: expanded to {} database(s)", rule.pattern, specs.len());
            }
            generated.extend(specs);
        }

        merge_databases(self.config.databases.clone(), generated)
    }
}

impl RunContext {
    /// Plan and (unless dry-run) copy one database.
    async fn run_database(&self, db: &DatabaseSpec) -> Result<()> {
        let source = self
            .connector
            .source(&db.name, self.config.parallel_tables())
            .await?;

        let outcome = self.migrate_database(db, &source).await;
        source.close().await;
        outcome
    }

    async fn migrate_database(&self, db: &DatabaseSpec, source: &Arc<dyn SourceReader>) -> Result<()> {
        let target_db = db.target_database().to_string();
        let PlannedDatabase { plan, described } = self.plan_database(db, source.as_ref()).await?;

        self.report.lock().await.record_plan(plan.clone());

        if self.config.dry_run {
            if !self.connector.target_database_exists(&target_db).await? {
                warn!("Target database '{}' does not exist", target_db);
                self.report.lock().await.warn(format!(
                    "{}: target database '{}' does not exist and would be created",
                    db.name, target_db
                ));
            }
            info!(
                "{}: dry run, {} table(s) in {} stratum/strata planned",
                db.name,
                plan.table_count(),
                plan.strata.len()
            );
            return Ok(());
        }

        if plan.tables.is_empty() {
            info!("{}: nothing to migrate", db.name);
            return Ok(());
        }

        ensure_target_database(self.connector.as_ref(), &target_db, &self.confirmation).await?;
        let target = self
            .connector
            .target(&target_db, self.config.parallel_tables())
            .await?;

        self.copy_plan(&plan, described, source, &target).await;
        target.close().await;
        Ok(())
    }

    /// Selection, row scope, and ordering. Reads the catalog only.
    async fn plan_database(&self, db: &DatabaseSpec, source: &dyn SourceReader) -> Result<PlannedDatabase> {
        let target_db = db.target_database();
        let live_tables = source.list_tables().await?;
        let exclude_date_tables = db
            .selection
            .exclude_date_tables
            .unwrap_or(self.config.exclude_date_tables);

        let selected = select_tables(SelectionInput {
            database: &db.name,
            target_database: target_db,
            live_tables: &live_tables,
            selection: &db.selection,
            exclude_date_tables,
        })?;

        let mut described = HashMap::new();
        let specs = match &db.selection.row_scope {
            None => selected,
            Some(scope) => {
                let mut specs = Vec::with_capacity(selected.len());
                for mut spec in selected {
                    let table = match source.describe_table(&spec.name).await {
                        Ok(table) => table,
                        Err(e) => {
                            error!("{}: {}", spec.source_full_name(), e);
                            self.report.lock().await.record_result(TransferResult::failed(
                                &spec,
                                std::time::Duration::ZERO,
                                &e,
                            ));
                            continue;
                        }
                    };
                    if spec.apply_row_scope(scope, &table) {
                        debug!("{}: scoped by {}", spec.source_full_name(), scope.column);
                    }
                    described.insert(spec.name.clone(), table);
                    specs.push(spec);
                }
                specs
            }
        };

        let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
        let resolution = if self.config.auto_order {
            let edges = source.foreign_keys(&names).await?;
            resolve(&names, &edges)
        } else {
            Resolution::unresolved(names.len())
        };

        let plan = build_plan(
            &db.name,
            target_db,
            specs,
            resolution,
            PlanFlags {
                auto_order: self.config.auto_order,
                truncate: self.config.truncate,
                create_tables: self.config.create_tables,
                exclude_date_tables,
            },
        );

        info!(
            "{}: plan of {} table(s) in {} stratum/strata -> {}",
            plan.database,
            plan.table_count(),
            plan.strata.len(),
            plan.target_database
        );
        Ok(PlannedDatabase { plan, described })
    }

    /// Copy every table, one stratum at a time.
    async fn copy_plan(
        &self,
        plan: &MigrationPlan,
        mut described: HashMap<String, Table>,
        source: &Arc<dyn SourceReader>,
        target: &Arc<dyn TargetWriter>,
    ) {
        let engine = TransferEngine::new(TransferConfig {
            batch_size: self.config.batch_size,
            read_ahead: self.config.read_ahead,
        });
        let replicator = SchemaReplicator::new(plan.create_tables, plan.truncate);
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_tables()));

        for (depth, stratum) in plan.stratum_specs().enumerate() {
            debug!(
                "{}: stratum {} ({} table(s))",
                plan.database,
                depth,
                stratum.len()
            );
            let mut handles = Vec::with_capacity(stratum.len());

            for spec in stratum {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let spec = spec.clone();
                let cached = described.remove(&spec.name);
                let engine = engine.clone();
                let source = Arc::clone(source);
                let target = Arc::clone(target);

                let task_spec = spec.clone();
                let handle = tokio::spawn(async move {
                    let result = copy_table(
                        &task_spec,
                        cached,
                        &engine,
                        replicator,
                        source.as_ref(),
                        target.as_ref(),
                    )
                    .await;
                    drop(permit);
                    result
                });
                handles.push((spec, handle));
            }

            // Barrier: the next stratum waits for every table of this one
            for (spec, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("{}: task panicked - {}", spec.source_full_name(), e);
                        TransferResult::failed(
                            &spec,
                            std::time::Duration::ZERO,
                            &MigrateError::transfer(spec.source_full_name(), format!("Task panicked: {}", e)),
                        )
                    }
                };
                self.report.lock().await.record_result(result);
            }
        }
    }
}

/// Describe, prepare, and copy one table. Failures end up in the result.
async fn copy_table(
    spec: &TableSpec,
    cached: Option<Table>,
    engine: &TransferEngine,
    replicator: SchemaReplicator,
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
) -> TransferResult {
    let start = Instant::now();

    let table = match cached {
        Some(table) => table,
        None => match source.describe_table(&spec.name).await {
            Ok(table) => table,
            Err(e) => {
                error!("{}: {}", spec.source_full_name(), e);
                return TransferResult::failed(spec, start.elapsed(), &e);
            }
        },
    };

    if let Err(e) = replicator.prepare(spec, &table, target).await {
        error!("{}: {}", spec.target_full_name(), e);
        return TransferResult::failed(spec, start.elapsed(), &e);
    }

    engine.execute(spec, &table, source, target).await
}
