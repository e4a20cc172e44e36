//! Configuration types.

use serde::{Deserialize, Deserializer, Serialize};

/// Root run document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Order tables by foreign-key dependencies (default: true).
    #[serde(default = "default_true")]
    pub auto_order: bool,

    /// Truncate each target table before its first batch (default: false).
    #[serde(default)]
    pub truncate: bool,

    /// Create missing target tables from source structure (default: true).
    #[serde(default = "default_true")]
    pub create_tables: bool,

    /// Skip date-suffixed tables in `all` mode (default: true).
    #[serde(default = "default_true")]
    pub exclude_date_tables: bool,

    /// Run databases and tables concurrently (default: true).
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Databases migrated concurrently (default: 3).
    #[serde(default = "default_max_workers", alias = "parallel_databases")]
    pub max_workers: usize,

    /// Tables migrated concurrently within one database (default: 5).
    #[serde(default = "default_max_table_workers", alias = "parallel_tables")]
    pub max_table_workers: usize,

    /// Rows per fetch/insert cycle (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches buffered between reader and writer (default: 2).
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,

    /// Plan and check only; move no rows and issue no DDL.
    #[serde(default)]
    pub dry_run: bool,

    /// Statically configured databases.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub databases: Vec<DatabaseSpec>,

    /// Lookup-driven database fan-out rules.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dynamic_databases: Vec<DynamicDatabaseRule>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            auto_order: true,
            truncate: false,
            create_tables: true,
            exclude_date_tables: true,
            parallel: true,
            max_workers: default_max_workers(),
            max_table_workers: default_max_table_workers(),
            batch_size: default_batch_size(),
            read_ahead: default_read_ahead(),
            dry_run: false,
            databases: Vec::new(),
            dynamic_databases: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Effective database-level concurrency.
    pub fn parallel_databases(&self) -> usize {
        if self.parallel {
            self.max_workers.max(1)
        } else {
            1
        }
    }

    /// Effective table-level concurrency within one database.
    pub fn parallel_tables(&self) -> usize {
        if self.parallel {
            self.max_table_workers.max(1)
        } else {
            1
        }
    }
}

/// One statically configured source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Source database name.
    pub name: String,

    /// Target database name (default: same as source).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,

    /// Table selection settings.
    #[serde(flatten)]
    pub selection: SelectionConfig,
}

impl DatabaseSpec {
    /// Create a spec selecting every table of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_name: None,
            selection: SelectionConfig::default(),
        }
    }

    /// Effective target database name.
    pub fn target_database(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }
}

/// Table selection settings shared by static and dynamic databases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Selection mode (default: all).
    #[serde(default)]
    pub mode: SelectionMode,

    /// Table names never migrated.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exclude: Vec<String>,

    /// Explicit table list (`tables` mode) or per-table overrides (`all` mode).
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tables: Vec<TableOverride>,

    /// Default WHERE predicate for every table.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Default row cap for every table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Overrides the global `exclude_date_tables` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_date_tables: Option<bool>,

    /// Restrict rows of tables carrying a scope column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_scope: Option<RowScope>,
}

/// How tables are chosen from a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Every base table in the live catalog.
    #[default]
    All,

    /// Only the tables listed under `tables`.
    #[serde(alias = "explicit_list", alias = "explicit-list", alias = "config")]
    Tables,
}

/// A table entry: a bare name or `{name, where, limit}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableOverride {
    Name(String),
    Detailed {
        name: String,
        #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
        where_clause: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
    },
}

impl TableOverride {
    pub fn name(&self) -> &str {
        match self {
            TableOverride::Name(name) | TableOverride::Detailed { name, .. } => name,
        }
    }

    pub fn where_clause(&self) -> Option<&str> {
        match self {
            TableOverride::Name(_) => None,
            TableOverride::Detailed { where_clause, .. } => where_clause.as_deref(),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        match self {
            TableOverride::Name(_) => None,
            TableOverride::Detailed { limit, .. } => *limit,
        }
    }
}

impl From<&str> for TableOverride {
    fn from(name: &str) -> Self {
        TableOverride::Name(name.to_string())
    }
}

/// Row filter applied to every selected table that has `column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowScope {
    /// Column to filter on.
    pub column: String,

    /// Accepted values.
    pub values: Vec<i64>,
}

/// Query that discovers the values a dynamic pattern expands over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupQuery {
    /// Source database the query runs in.
    pub database: String,

    /// Query returning exactly one column.
    pub sql: String,
}

/// A database name pattern expanded once per lookup value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicDatabaseRule {
    /// Source name pattern with one `{token}` placeholder.
    pub pattern: String,

    /// Lookup supplying placeholder values.
    #[serde(alias = "lookup")]
    pub lookup_query: LookupQuery,

    /// Target name pattern (default: the generated source name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pattern: Option<String>,

    /// Table selection inherited by every generated database.
    #[serde(flatten)]
    pub selection: SelectionConfig,
}

/// Connection settings for one MySQL server.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_charset")]
    pub charset: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            charset: default_charset(),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .finish()
    }
}

/// Treat an explicit YAML `null` like a missing list.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    3
}

fn default_max_table_workers() -> usize {
    5
}

fn default_batch_size() -> usize {
    1000
}

fn default_read_ahead() -> usize {
    2
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}
