//! Target structure: database confirmation and table replication.
//!
//! Creating a missing target *database* is the one decision a run can ask
//! about. It goes through [`Confirmation`], so automation can answer
//! without a terminal. Table creation and truncation are plan flags and
//! never ask.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::core::{Connector, Table, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::plan::TableSpec;

/// Decision callback: receives the missing database name, returns whether to create it.
pub type ConfirmFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Serializes interactive prompts from concurrently running databases.
static PROMPT_LOCK: Mutex<()> = Mutex::new(());

/// How to answer "create missing target database?".
#[derive(Clone)]
pub enum Confirmation {
    AlwaysYes,
    AlwaysNo,
    Callback(ConfirmFn),
}

impl Confirmation {
    /// Wrap a (possibly blocking) decision function.
    pub fn callback<F>(decide: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Confirmation::Callback(Arc::new(decide))
    }

    /// Ask whether `database` may be created.
    pub async fn confirm(&self, database: &str) -> bool {
        match self {
            Confirmation::AlwaysYes => true,
            Confirmation::AlwaysNo => false,
            Confirmation::Callback(decide) => {
                let decide = Arc::clone(decide);
                let database = database.to_string();
                tokio::task::spawn_blocking(move || {
                    let _guard = PROMPT_LOCK.lock().unwrap_or_else(|p| p.into_inner());
                    decide(&database)
                })
                .await
                .unwrap_or(false)
            }
        }
    }
}

impl fmt::Debug for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::AlwaysYes => f.write_str("AlwaysYes"),
            Confirmation::AlwaysNo => f.write_str("AlwaysNo"),
            Confirmation::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Make sure the target database exists, creating it if confirmed.
///
/// Returns whether the database was created.
///
/// # Errors
///
/// `MigrateError::ConfirmationDeclined` if creation was refused.
pub async fn ensure_target_database(
    connector: &dyn Connector,
    database: &str,
    confirmation: &Confirmation,
) -> Result<bool> {
    if connector.target_database_exists(database).await? {
        return Ok(false);
    }

    warn!("Target database '{}' does not exist", database);
    if !confirmation.confirm(database).await {
        return Err(MigrateError::ConfirmationDeclined(database.to_string()));
    }

    connector.create_target_database(database).await?;
    info!("Created target database '{}'", database);
    Ok(true)
}

/// Prepares target tables before their first batch.
#[derive(Debug, Clone, Copy)]
pub struct SchemaReplicator {
    create_tables: bool,
    truncate: bool,
}

impl SchemaReplicator {
    pub fn new(create_tables: bool, truncate: bool) -> Self {
        Self {
            create_tables,
            truncate,
        }
    }

    /// Create the target table if missing, then truncate it if requested.
    ///
    /// # Errors
    ///
    /// `MigrateError::Schema` if the table is missing and creation is
    /// disabled, or if DDL fails.
    pub async fn prepare(
        &self,
        spec: &TableSpec,
        source: &Table,
        target: &dyn TargetWriter,
    ) -> Result<()> {
        let target_table = spec.target_full_name();

        if !target.table_exists(&spec.target_name).await? {
            if !self.create_tables {
                return Err(MigrateError::schema(
                    &target_table,
                    "target table does not exist and create_tables is disabled",
                ));
            }
            target
                .create_table(source, &spec.target_name)
                .await
                .map_err(|e| MigrateError::schema(&target_table, e))?;
            info!("Created table {}", target_table);
        }

        if self.truncate {
            target
                .truncate_table(&spec.target_name)
                .await
                .map_err(|e| MigrateError::schema(&target_table, e))?;
            debug!("Truncated {}", target_table);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_confirmation_variants() {
        assert!(Confirmation::AlwaysYes.confirm("db").await);
        assert!(!Confirmation::AlwaysNo.confirm("db").await);

        let asked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&asked);
        let confirm = Confirmation::callback(move |db| {
            counter.fetch_add(1, Ordering::SeqCst);
            db.starts_with("tenant_")
        });

        assert!(confirm.confirm("tenant_5").await);
        assert!(!confirm.confirm("prod").await);
        assert_eq!(asked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_confirmation_debug() {
        assert_eq!(format!("{:?}", Confirmation::callback(|_| true)), "Callback");
    }
}
