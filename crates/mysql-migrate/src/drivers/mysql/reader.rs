//! MySQL source reader.
//!
//! Uses SQLx for pooling and catalog queries. Row data is read over the
//! text protocol as one unbuffered query per table: rows are pulled off the
//! socket as the batch channel drains, so the full result set is never
//! materialised. Each text value is then parsed by its column type.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Connection as _, Row, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::dialect;
use crate::config::ConnectionConfig;
use crate::core::schema::{Column, ForeignKeyEdge, Table};
use crate::core::traits::{ReadOptions, SourceReader};
use crate::core::value::{Batch, SqlValue};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Column types carried as raw bytes.
const BINARY_TYPES: &[&str] = &[
    "binary",
    "varbinary",
    "tinyblob",
    "blob",
    "mediumblob",
    "longblob",
    "bit",
    "geometry",
    "point",
    "linestring",
    "polygon",
    "multipoint",
    "multilinestring",
    "multipolygon",
    "geometrycollection",
    "geomcollection",
];

/// Build SQLx connect options for a server, optionally selecting a database.
pub(crate) fn connect_options(config: &ConnectionConfig, database: Option<&str>) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .charset(&config.charset)
        .ssl_mode(MySqlSslMode::Preferred);
    if let Some(database) = database {
        options = options.database(database);
    }
    options
}

/// Parse one text-protocol value by its source column type.
///
/// Values that do not parse into the typed form (zero dates, TIME beyond
/// 24h, decimals wider than 28 digits) are kept as text, which MySQL
/// accepts back unchanged.
pub(crate) fn parse_value(column: &Column, raw: Vec<u8>) -> SqlValue {
    let data_type = column.data_type.as_str();
    if BINARY_TYPES.contains(&data_type) {
        return SqlValue::Bytes(raw);
    }

    let text = match String::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => return SqlValue::Bytes(e.into_bytes()),
    };

    let parsed = match data_type {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            if column.is_unsigned() {
                text.parse::<u64>().ok().map(SqlValue::UInt)
            } else {
                text.parse::<i64>().ok().map(SqlValue::Int)
            }
        }
        "float" => text.parse::<f32>().ok().map(SqlValue::Float),
        "double" | "real" => text.parse::<f64>().ok().map(SqlValue::Double),
        "decimal" | "numeric" => Decimal::from_str_exact(&text).ok().map(SqlValue::Decimal),
        "date" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .ok()
            .map(SqlValue::Date),
        "time" => NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
            .ok()
            .map(SqlValue::Time),
        "datetime" | "timestamp" => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(SqlValue::DateTime),
        _ => None,
    };

    parsed.unwrap_or(SqlValue::Text(text))
}

/// Raw bytes of column `idx`, or `None` for NULL.
fn raw_bytes(row: &MySqlRow, idx: usize) -> std::result::Result<Option<Vec<u8>>, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(None);
    }
    // Text protocol: every value is its textual (or binary) payload
    row.try_get_unchecked::<Vec<u8>, _>(idx).map(Some)
}

/// MySQL source reader bound to one database.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Create a new reader with a pool of at most `max_conns` connections.
    pub async fn new(config: &ConnectionConfig, database: &str, max_conns: usize) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(connect_options(config, Some(database)))
            .await
            .map_err(|e| MigrateError::connection(database, e))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connection(database, e))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, database
        );

        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    /// Convert a MySQL row to values in `columns` order.
    fn row_to_values(row: &MySqlRow, columns: &[Column]) -> std::result::Result<Vec<SqlValue>, sqlx::Error> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                Ok(match raw_bytes(row, idx)? {
                    None => SqlValue::Null,
                    Some(raw) => parse_value(col, raw),
                })
            })
            .collect()
    }

    async fn read_table_impl(
        pool: MySqlPool,
        opts: ReadOptions,
        tx: mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let table_name = format!("{}.{}", opts.database, opts.table);
        let sql = dialect::build_select(
            &opts.database,
            &opts.table,
            &opts.columns,
            opts.where_clause.as_deref(),
            opts.limit,
        )?;
        debug!("{}: {}", table_name, sql);

        let batch_size = opts.batch_size.max(1);
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| MigrateError::connection(&opts.database, e))?;
        let mut rows = sqlx::raw_sql(&sql).fetch(&mut *conn);
        let mut buffer = Vec::with_capacity(batch_size);
        let mut exhausted = false;

        let outcome: Result<()> = loop {
            let row = match rows.try_next().await {
                Ok(Some(row)) => row,
                Ok(None) => {
                    exhausted = true;
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            };
            let values = match Self::row_to_values(&row, &opts.columns) {
                Ok(values) => values,
                Err(e) => {
                    break Err(MigrateError::transfer(
                        &table_name,
                        format!("decoding row: {}", e),
                    ))
                }
            };
            buffer.push(values);

            if buffer.len() == batch_size {
                let full = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
                if tx.send(Ok(Batch::new(full))).await.is_err() {
                    debug!("{}: receiver dropped, abandoning read", table_name);
                    break Ok(());
                }
            }
        };
        drop(rows);

        if !exhausted {
            // Unread rows would be drained off the socket before pool reuse
            let _ = conn.detach().close_hard().await;
            return outcome;
        }

        // The remainder (possibly empty) closes the stream
        let _ = tx.send(Ok(Batch::new(buffer).mark_final())).await;
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("TABLE_NAME"))
            .collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Table> {
        // Generated columns cannot be inserted into, so they are not copied
        let columns_query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(LOWER(DATA_TYPE) AS CHAR(64)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(4096)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND EXTRA NOT LIKE '%GENERATED%'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(columns_query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut result = Table::new(&self.database, table);
        if rows.is_empty() {
            return Err(MigrateError::schema(
                result.full_name(),
                "table not found in source catalog",
            ));
        }

        for row in rows {
            result.columns.push(Column {
                name: row.get::<String, _>("COLUMN_NAME"),
                data_type: row.get::<String, _>("DATA_TYPE"),
                column_type: row.get::<String, _>("COLUMN_TYPE"),
                is_nullable: row.get::<i64, _>("is_nullable") == 1,
                is_identity: row.get::<i64, _>("is_identity") == 1,
                ordinal_pos: row.get::<i64, _>("ORDINAL_POSITION") as i32,
            });
        }

        let pk_query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let pk_rows: Vec<MySqlRow> = sqlx::query(pk_query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        result.primary_key = pk_rows
            .iter()
            .map(|row| row.get::<String, _>("COLUMN_NAME"))
            .collect();

        debug!(
            "Described {}: {} columns, pk [{}]",
            result.full_name(),
            result.columns.len(),
            result.primary_key.join(", ")
        );
        Ok(result)
    }

    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKeyEdge>> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }

        let query = r#"
            SELECT DISTINCT
                CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY TABLE_NAME, REFERENCED_TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        let selected: HashSet<&str> = tables.iter().map(String::as_str).collect();
        let edges: Vec<ForeignKeyEdge> = rows
            .iter()
            .map(|row| {
                ForeignKeyEdge::new(
                    row.get::<String, _>("TABLE_NAME"),
                    row.get::<String, _>("REFERENCED_TABLE_NAME"),
                )
            })
            .filter(|e| selected.contains(e.child.as_str()) && selected.contains(e.parent.as_str()))
            .collect();

        debug!("{}: {} foreign-key edge(s) among selected tables", self.database, edges.len());
        Ok(edges)
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(opts.read_ahead.max(1));
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let result = Self::read_table_impl(pool, opts, tx.clone()).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Text values of lookup rows, in result column order.
pub(crate) fn lookup_rows(rows: &[MySqlRow]) -> Result<Vec<Vec<SqlValue>>> {
    let values = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|idx| {
                    Ok(match raw_bytes(row, idx)? {
                        None => SqlValue::Null,
                        Some(raw) => SqlValue::Text(String::from_utf8_lossy(&raw).into_owned()),
                    })
                })
                .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

    Ok(values)
}
