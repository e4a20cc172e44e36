//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

/// Environment prefix for source connection settings.
pub const SOURCE_ENV_PREFIX: &str = "SOURCE_DB_";

/// Environment prefix for target connection settings.
pub const TARGET_ENV_PREFIX: &str = "TARGET_DB_";

/// Annotated example run document written by `init`.
pub const EXAMPLE_CONFIG: &str = r#"# mysql-migrate run configuration
#
# Connection settings come from the environment (or a .env file):
#   SOURCE_DB_HOST, SOURCE_DB_PORT, SOURCE_DB_USER, SOURCE_DB_PASSWORD
#   TARGET_DB_HOST, TARGET_DB_PORT, TARGET_DB_USER, TARGET_DB_PASSWORD

auto_order: true          # order tables by foreign keys
truncate: false           # empty target tables before copying
create_tables: true       # create missing target tables
exclude_date_tables: true # skip tables like orders_20240101

parallel: true
max_workers: 3            # databases at once
max_table_workers: 5      # tables at once per database
batch_size: 1000

databases:
  # every table
  - name: shop

  # every table except a few, copied into another database
  - name: analytics
    target_name: analytics_copy
    exclude:
      - raw_events
      - tmp_import

  # an explicit table list with per-table filters
  - name: crm
    mode: tables
    tables:
      - customers
      - name: orders
        where: "created_at >= '2024-01-01'"
        limit: 10000

dynamic_databases:
  # one database per tenant id returned by the lookup
  - pattern: "tenant_{tenant_id}"
    lookup_query:
      database: control
      sql: "SELECT tenant_id FROM tenants WHERE active = 1"
    mode: all
    exclude:
      - audit_log
"#;

impl RunConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionConfig {
    /// Read settings from `{prefix}HOST`, `{prefix}PORT`, `{prefix}USER`,
    /// `{prefix}PASSWORD` and `{prefix}CHARSET`, falling back to defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`ConnectionConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{}{}", prefix, key));
        let mut config = ConnectionConfig::default();

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT") {
            config.port = port.trim().parse().map_err(|_| {
                MigrateError::Config(format!("{}PORT is not a valid port: {:?}", prefix, port))
            })?;
        }
        if let Some(user) = get("USER") {
            config.user = user;
        }
        if let Some(password) = get("PASSWORD") {
            config.password = password;
        }
        if let Some(charset) = get("CHARSET") {
            config.charset = charset;
        }

        Ok(config)
    }

    /// Settings with the password masked, for display.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if !masked.password.is_empty() {
            masked.password = "*".repeat(8);
        }
        masked
    }
}
