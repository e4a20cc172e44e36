//! MySQL target writer.
//!
//! Uses mysql_async for pooling and multi-row `INSERT IGNORE`. Each batch is
//! written in one transaction, split into statements that stay under the
//! placeholder limit.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, TxOpts, Value};
use tracing::{debug, info};

use super::dialect;
use crate::config::ConnectionConfig;
use crate::core::schema::Table;
use crate::core::traits::TargetWriter;
use crate::core::value::{Batch, SqlValue};
use crate::error::{MigrateError, Result};

/// Build a mysql_async pool for a server, optionally selecting a database.
pub(crate) fn build_pool(
    config: &ConnectionConfig,
    database: Option<&str>,
    max_conns: usize,
) -> Result<Pool> {
    if !config
        .charset
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MigrateError::Config(format!(
            "invalid charset '{}'",
            config.charset
        )));
    }

    let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
        MigrateError::Config(format!("invalid target pool size {}", max_conns))
    })?;

    let builder = OptsBuilder::default()
        .ip_or_hostname(&config.host)
        .tcp_port(config.port)
        .db_name(database)
        .user(Some(&config.user))
        .pass(Some(&config.password))
        .init(vec![format!("SET NAMES {}", config.charset)])
        .pool_opts(PoolOpts::new().with_constraints(constraints));

    let opts: Opts = builder.into();
    Ok(Pool::new(opts))
}

/// Convert a value to its mysql_async parameter.
pub(crate) fn to_mysql_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Int(i) => Value::Int(i),
        SqlValue::UInt(u) => Value::UInt(u),
        SqlValue::Float(f) => Value::Float(f),
        SqlValue::Double(f) => Value::Double(f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

/// MySQL target writer bound to one database.
pub struct MysqlWriter {
    pool: Pool,
    database: String,
}

impl MysqlWriter {
    /// Create a new writer with a pool of at most `max_conns` connections.
    pub async fn new(config: &ConnectionConfig, database: &str, max_conns: usize) -> Result<Self> {
        let pool = build_pool(config, Some(database), max_conns)?;

        // Test connection
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(database, e))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(database, e))?;
        drop(conn);

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, database
        );

        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    async fn conn(&self) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(&self.database, e))
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.conn().await?;

        let sql = r#"
            SELECT COUNT(*) AS cnt FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let count: Option<i64> = conn.exec_first(sql, (&self.database, table)).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn create_table(&self, source: &Table, target_name: &str) -> Result<()> {
        let ddl = dialect::build_create_table(&self.database, target_name, source)?;
        debug!("{}", ddl);

        let mut conn = self.conn().await?;
        conn.query_drop(&ddl).await?;
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let sql = dialect::build_truncate(&self.database, table)?;
        let mut conn = self.conn().await?;
        conn.query_drop(&sql).await?;
        Ok(())
    }

    async fn insert_ignore(&self, table: &str, columns: &[String], batch: Batch) -> Result<u64> {
        if batch.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let qualified = format!("{}.{}", self.database, table);
        let chunk_rows = dialect::max_rows_per_statement(columns.len());
        let mut conn = self.conn().await?;
        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        let mut written = 0u64;

        let mut rows = batch.rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Vec<SqlValue>> = rows.by_ref().take(chunk_rows).collect();
            let sql = dialect::build_insert_ignore(&self.database, table, columns, chunk.len())?;
            let params: Vec<Value> = chunk
                .into_iter()
                .flat_map(|row| row.into_iter().map(to_mysql_value))
                .collect();

            tx.exec_drop(&sql, params)
                .await
                .map_err(|e| MigrateError::transfer(&qualified, format!("INSERT IGNORE: {}", e)))?;
            written += tx.affected_rows();
        }

        tx.commit().await?;
        debug!("{}: {} row(s) persisted", qualified, written);
        Ok(written)
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    #[test]
    fn test_to_mysql_value_scalars() {
        assert_eq!(to_mysql_value(SqlValue::Null), Value::NULL);
        assert_eq!(to_mysql_value(SqlValue::Int(-3)), Value::Int(-3));
        assert_eq!(to_mysql_value(SqlValue::UInt(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(
            to_mysql_value(SqlValue::Decimal(Decimal::new(1250, 2))),
            Value::Bytes(b"12.50".to_vec())
        );
        assert_eq!(
            to_mysql_value(SqlValue::Text("héllo".into())),
            Value::Bytes("héllo".as_bytes().to_vec())
        );
    }

    #[test]
    fn test_to_mysql_value_temporal() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 678)
            .unwrap();
        assert_eq!(
            to_mysql_value(SqlValue::DateTime(dt)),
            Value::Date(2024, 1, 2, 3, 4, 5, 678)
        );
        assert_eq!(
            to_mysql_value(SqlValue::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap())),
            Value::Date(1999, 12, 31, 0, 0, 0, 0)
        );
        assert_eq!(
            to_mysql_value(SqlValue::Time(NaiveTime::from_hms_micro_opt(23, 59, 1, 5).unwrap())),
            Value::Time(false, 0, 23, 59, 1, 5)
        );
    }

    #[test]
    fn test_build_pool_rejects_bad_charset() {
        let config = ConnectionConfig {
            charset: "utf8mb4; DROP".into(),
            ..ConnectionConfig::default()
        };
        assert!(build_pool(&config, None, 2).unwrap_err().is_config());
    }
}
