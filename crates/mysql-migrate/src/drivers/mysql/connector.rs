//! Server-level connector: opens per-database readers and writers.

use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::Pool;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{Column as _, Executor};
use tracing::debug;

use super::reader::{connect_options, lookup_rows, MysqlReader};
use super::writer::{build_pool, MysqlWriter};
use super::dialect;
use crate::config::ConnectionConfig;
use crate::core::traits::{Connector, LookupResult, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};

/// Connections administered on the target server, outside any database.
const ADMIN_POOL_SIZE: usize = 2;

/// Connects to a source server (SQLx) and a target server (mysql_async).
pub struct MysqlConnector {
    source: ConnectionConfig,
    target: ConnectionConfig,
    admin: Pool,
}

impl MysqlConnector {
    /// Create a connector. No connection is made until first use.
    pub fn new(source: ConnectionConfig, target: ConnectionConfig) -> Result<Self> {
        let admin = build_pool(&target, None, ADMIN_POOL_SIZE)?;
        Ok(Self {
            source,
            target,
            admin,
        })
    }

    /// Release the target-server admin pool.
    pub async fn close(&self) {
        self.admin.clone().disconnect().await.ok();
    }

    async fn admin_conn(&self) -> Result<mysql_async::Conn> {
        self.admin
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(&self.target.host, e))
    }
}

#[async_trait]
impl Connector for MysqlConnector {
    async fn source(&self, database: &str, max_conns: usize) -> Result<Arc<dyn SourceReader>> {
        let reader = MysqlReader::new(&self.source, database, max_conns).await?;
        Ok(Arc::new(reader))
    }

    async fn target(&self, database: &str, max_conns: usize) -> Result<Arc<dyn TargetWriter>> {
        let writer = MysqlWriter::new(&self.target, database, max_conns).await?;
        Ok(Arc::new(writer))
    }

    async fn target_database_exists(&self, database: &str) -> Result<bool> {
        let mut conn = self.admin_conn().await?;
        let found: Option<String> = conn
            .exec_first(
                "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
                (database,),
            )
            .await?;
        Ok(found.is_some())
    }

    async fn create_target_database(&self, database: &str) -> Result<()> {
        let sql = dialect::build_create_database(database)?;
        let mut conn = self.admin_conn().await?;
        conn.query_drop(&sql).await?;
        debug!("{}", sql);
        Ok(())
    }

    async fn lookup(&self, database: &str, sql: &str) -> Result<LookupResult> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(&self.source, Some(database)))
            .await
            .map_err(|e| MigrateError::connection(database, e))?;

        let outcome = run_lookup(&pool, sql).await;
        pool.close().await;

        let result = outcome?;
        debug!("Lookup on {} returned {} row(s)", database, result.rows.len());
        Ok(result)
    }
}

/// Column names come from statement metadata, so they are known even when
/// no row comes back.
async fn run_lookup(pool: &MySqlPool, sql: &str) -> Result<LookupResult> {
    let described = pool.describe(sql).await?;
    let columns = described
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = sqlx::raw_sql(sql).fetch_all(pool).await?;
    Ok(LookupResult {
        columns,
        rows: lookup_rows(&rows)?,
    })
}
