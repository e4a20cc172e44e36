//! In-memory MySQL stand-in for integration tests.
//!
//! `FakeServer` implements `Connector` over a source catalog held in memory
//! and a target that enforces primary keys the way `INSERT IGNORE` does.
//! Every data read, insert, DDL and truncate is logged as an [`Event`] with
//! a global sequence number, so tests can check what ran and in which order.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use mysql_migrate::core::{
    Batch, Column, Connector, ForeignKeyEdge, LookupResult, ReadOptions, SourceReader, SqlValue,
    Table, TargetWriter,
};
use mysql_migrate::{MigrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Read,
    InsertStart,
    InsertEnd,
    CreateTable,
    Truncate,
    CreateDatabase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub database: String,
    pub table: String,
    pub seq: usize,
}

struct SourceTable {
    table: Table,
    rows: Vec<Vec<SqlValue>>,
    fail_describe: bool,
    fail_read: bool,
}

#[derive(Default)]
struct SourceDb {
    tables: BTreeMap<String, SourceTable>,
    edges: Vec<ForeignKeyEdge>,
}

#[derive(Default)]
struct TargetTable {
    pk: Vec<usize>,
    keys: HashSet<String>,
    rows: Vec<Vec<SqlValue>>,
}

#[derive(Default)]
struct Inner {
    source: Mutex<HashMap<String, SourceDb>>,
    target: Mutex<HashMap<String, HashMap<String, TargetTable>>>,
    lookups: Mutex<HashMap<String, LookupResult>>,
    events: Mutex<Vec<Event>>,
    seq: AtomicUsize,
    insert_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Shared handle to the fake server.
#[derive(Clone, Default)]
pub struct FakeServer {
    inner: Arc<Inner>,
}

/// Integer column.
pub fn int_column(name: &str, pos: i32) -> Column {
    Column {
        name: name.to_string(),
        data_type: "int".into(),
        column_type: "int(11)".into(),
        is_nullable: false,
        is_identity: false,
        ordinal_pos: pos,
    }
}

/// Table of integer columns with `id` as primary key.
pub fn int_table(database: &str, name: &str, columns: &[&str]) -> Table {
    let mut table = Table::new(database, name);
    table.columns.push(int_column("id", 1));
    for (i, col) in columns.iter().enumerate() {
        table.columns.push(int_column(col, i as i32 + 2));
    }
    table.primary_key.push("id".into());
    table
}

/// Rows `id = 1..=count`, other columns zero.
pub fn id_rows(count: usize, width: usize) -> Vec<Vec<SqlValue>> {
    (1..=count as i64)
        .map(|id| {
            let mut row = vec![SqlValue::Int(id)];
            row.resize(width, SqlValue::Int(0));
            row
        })
        .collect()
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: EventKind, database: &str, table: &str) {
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        self.inner.events.lock().unwrap().push(Event {
            kind,
            database: database.to_string(),
            table: table.to_string(),
            seq,
        });
    }

    /// Add a source table with its rows (columns from `table`).
    pub fn add_source_table(&self, table: Table, rows: Vec<Vec<SqlValue>>) {
        let mut source = self.inner.source.lock().unwrap();
        source.entry(table.database.clone()).or_default().tables.insert(
            table.name.clone(),
            SourceTable {
                table,
                rows,
                fail_describe: false,
                fail_read: false,
            },
        );
    }

    /// Add a source database with integer tables of `rows` rows each.
    pub fn add_source_db(&self, database: &str, tables: &[&str], rows: usize) {
        for name in tables {
            self.add_source_table(int_table(database, name, &[]), id_rows(rows, 1));
        }
    }

    pub fn add_edge(&self, database: &str, child: &str, parent: &str) {
        let mut source = self.inner.source.lock().unwrap();
        source
            .entry(database.to_string())
            .or_default()
            .edges
            .push(ForeignKeyEdge::new(child, parent));
    }

    pub fn fail_describe(&self, database: &str, table: &str) {
        let mut source = self.inner.source.lock().unwrap();
        if let Some(t) = source.get_mut(database).and_then(|db| db.tables.get_mut(table)) {
            t.fail_describe = true;
        }
    }

    pub fn fail_read(&self, database: &str, table: &str) {
        let mut source = self.inner.source.lock().unwrap();
        if let Some(t) = source.get_mut(database).and_then(|db| db.tables.get_mut(table)) {
            t.fail_read = true;
        }
    }

    pub fn add_target_database(&self, database: &str) {
        self.inner
            .target
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default();
    }

    /// Pre-existing target table (pk on column 0) holding `rows`.
    pub fn add_target_rows(&self, database: &str, table: &str, rows: Vec<Vec<SqlValue>>) {
        let mut target = self.inner.target.lock().unwrap();
        let tables = target.entry(database.to_string()).or_default();
        let entry = tables.entry(table.to_string()).or_insert_with(|| TargetTable {
            pk: vec![0],
            ..TargetTable::default()
        });
        for row in rows {
            entry.keys.insert(format!("{:?}", row[0]));
            entry.rows.push(row);
        }
    }

    pub fn set_lookup(&self, sql: &str, result: LookupResult) {
        self.inner
            .lookups
            .lock()
            .unwrap()
            .insert(sql.to_string(), result);
    }

    pub fn set_insert_delay(&self, delay: Duration) {
        *self.inner.insert_delay.lock().unwrap() = delay;
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn target_has_database(&self, database: &str) -> bool {
        self.inner.target.lock().unwrap().contains_key(database)
    }

    pub fn target_row_count(&self, database: &str, table: &str) -> usize {
        self.inner
            .target
            .lock()
            .unwrap()
            .get(database)
            .and_then(|db| db.get(table))
            .map_or(0, |t| t.rows.len())
    }

    pub fn reader(&self, database: &str) -> FakeReader {
        FakeReader {
            server: self.clone(),
            database: database.to_string(),
        }
    }

    pub fn writer(&self, database: &str) -> FakeWriter {
        FakeWriter {
            server: self.clone(),
            database: database.to_string(),
        }
    }
}

pub struct FakeReader {
    server: FakeServer,
    database: String,
}

#[async_trait]
impl SourceReader for FakeReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let source = self.server.inner.source.lock().unwrap();
        Ok(source
            .get(&self.database)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn describe_table(&self, table: &str) -> Result<Table> {
        let source = self.server.inner.source.lock().unwrap();
        match source.get(&self.database).and_then(|db| db.tables.get(table)) {
            Some(t) if !t.fail_describe => Ok(t.table.clone()),
            _ => Err(MigrateError::schema(
                format!("{}.{}", self.database, table),
                "table not found in source catalog",
            )),
        }
    }

    async fn foreign_keys(&self, tables: &[String]) -> Result<Vec<ForeignKeyEdge>> {
        let source = self.server.inner.source.lock().unwrap();
        let selected: HashSet<&str> = tables.iter().map(String::as_str).collect();
        Ok(source
            .get(&self.database)
            .map(|db| {
                db.edges
                    .iter()
                    .filter(|e| selected.contains(e.child.as_str()) && selected.contains(e.parent.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        self.server.record(EventKind::Read, &self.database, &opts.table);

        let (rows, fail_read) = {
            let source = self.server.inner.source.lock().unwrap();
            match source.get(&self.database).and_then(|db| db.tables.get(&opts.table)) {
                Some(t) => (t.rows.clone(), t.fail_read),
                None => (Vec::new(), true),
            }
        };
        let limit = opts.limit.map_or(rows.len(), |l| l as usize);
        let table_name = format!("{}.{}", self.database, opts.table);
        let (tx, rx) = mpsc::channel(opts.read_ahead.max(1));

        tokio::spawn(async move {
            let batch_size = opts.batch_size.max(1);
            let mut buffer = Vec::with_capacity(batch_size);
            for row in rows.into_iter().take(limit) {
                buffer.push(row);
                if buffer.len() == batch_size {
                    let full = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
                    if tx.send(Ok(Batch::new(full))).await.is_err() {
                        return;
                    }
                    if fail_read {
                        let _ = tx
                            .send(Err(MigrateError::transfer(&table_name, "Lost connection to MySQL server")))
                            .await;
                        return;
                    }
                }
            }
            if fail_read {
                let _ = tx
                    .send(Err(MigrateError::transfer(&table_name, "Lost connection to MySQL server")))
                    .await;
                return;
            }
            let _ = tx.send(Ok(Batch::new(buffer).mark_final())).await;
        });

        rx
    }

    async fn close(&self) {}
}

pub struct FakeWriter {
    server: FakeServer,
    database: String,
}

#[async_trait]
impl TargetWriter for FakeWriter {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let target = self.server.inner.target.lock().unwrap();
        Ok(target
            .get(&self.database)
            .is_some_and(|db| db.contains_key(table)))
    }

    async fn create_table(&self, source: &Table, target_name: &str) -> Result<()> {
        self.server
            .record(EventKind::CreateTable, &self.database, target_name);
        let pk = source
            .primary_key
            .iter()
            .filter_map(|pk| source.columns.iter().position(|c| &c.name == pk))
            .collect();

        let mut target = self.server.inner.target.lock().unwrap();
        let db = target.get_mut(&self.database).ok_or_else(|| {
            MigrateError::schema(target_name, format!("Unknown database '{}'", self.database))
        })?;
        db.entry(target_name.to_string()).or_insert_with(|| TargetTable {
            pk,
            ..TargetTable::default()
        });
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.server.record(EventKind::Truncate, &self.database, table);
        let mut target = self.server.inner.target.lock().unwrap();
        if let Some(t) = target.get_mut(&self.database).and_then(|db| db.get_mut(table)) {
            t.keys.clear();
            t.rows.clear();
        }
        Ok(())
    }

    async fn insert_ignore(&self, table: &str, _columns: &[String], batch: Batch) -> Result<u64> {
        let inner = &self.server.inner;
        self.server.record(EventKind::InsertStart, &self.database, table);
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *inner.insert_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let written = {
            let mut target = inner.target.lock().unwrap();
            match target.get_mut(&self.database).and_then(|db| db.get_mut(table)) {
                None => Err(MigrateError::transfer(
                    format!("{}.{}", self.database, table),
                    "Table doesn't exist",
                )),
                Some(t) => {
                    let mut written = 0u64;
                    for row in batch.rows {
                        let key: Vec<String> = t.pk.iter().map(|&i| format!("{:?}", row[i])).collect();
                        if t.pk.is_empty() || t.keys.insert(key.join("|")) {
                            t.rows.push(row);
                            written += 1;
                        }
                    }
                    Ok(written)
                }
            }
        };

        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.server.record(EventKind::InsertEnd, &self.database, table);
        written
    }

    async fn close(&self) {}
}

#[async_trait]
impl Connector for FakeServer {
    async fn source(&self, database: &str, _max_conns: usize) -> Result<Arc<dyn SourceReader>> {
        if !self.inner.source.lock().unwrap().contains_key(database) {
            return Err(MigrateError::connection(
                database,
                format!("Unknown database '{}'", database),
            ));
        }
        Ok(Arc::new(self.reader(database)))
    }

    async fn target(&self, database: &str, _max_conns: usize) -> Result<Arc<dyn TargetWriter>> {
        if !self.target_has_database(database) {
            return Err(MigrateError::connection(
                database,
                format!("Unknown database '{}'", database),
            ));
        }
        Ok(Arc::new(self.writer(database)))
    }

    async fn target_database_exists(&self, database: &str) -> Result<bool> {
        Ok(self.target_has_database(database))
    }

    async fn create_target_database(&self, database: &str) -> Result<()> {
        self.record(EventKind::CreateDatabase, database, "");
        self.add_target_database(database);
        Ok(())
    }

    async fn lookup(&self, database: &str, sql: &str) -> Result<LookupResult> {
        self.inner
            .lookups
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| MigrateError::connection(database, "Access denied"))
    }
}
