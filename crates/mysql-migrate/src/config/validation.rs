//! Configuration validation.
//!
//! Everything checkable without a connection is checked here, so a broken
//! document fails before any database is touched.

use super::{RunConfig, SelectionConfig, SelectionMode};
use crate::core::identifier::{validate_identifier, validate_predicate};
use crate::error::{MigrateError, Result};
use crate::plan::NamePattern;

/// Validate the configuration.
pub fn validate(config: &RunConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(MigrateError::Config("batch_size must be at least 1".into()));
    }
    if config.read_ahead == 0 {
        return Err(MigrateError::Config("read_ahead must be at least 1".into()));
    }
    if config.max_workers == 0 {
        return Err(MigrateError::Config("max_workers must be at least 1".into()));
    }
    if config.max_table_workers == 0 {
        return Err(MigrateError::Config(
            "max_table_workers must be at least 1".into(),
        ));
    }

    if config.databases.is_empty() && config.dynamic_databases.is_empty() {
        return Err(MigrateError::Config(
            "at least one entry in databases or dynamic_databases is required".into(),
        ));
    }

    for db in &config.databases {
        validate_identifier(&db.name)
            .map_err(|e| MigrateError::Config(format!("databases[].name: {}", e)))?;
        if let Some(target) = &db.target_name {
            validate_identifier(target).map_err(|e| {
                MigrateError::Config(format!("databases[{}].target_name: {}", db.name, e))
            })?;
        }
        validate_selection(&db.name, &db.selection)?;
    }

    for rule in &config.dynamic_databases {
        let source = NamePattern::parse(&rule.pattern)?;
        if let Some(target_pattern) = &rule.target_pattern {
            let target = NamePattern::parse(target_pattern)?;
            if target.token() != source.token() {
                return Err(MigrateError::Config(format!(
                    "target_pattern '{}' must use the same placeholder as '{}'",
                    target_pattern, rule.pattern
                )));
            }
        }
        validate_identifier(&rule.lookup_query.database).map_err(|e| {
            MigrateError::Config(format!("lookup_query.database for '{}': {}", rule.pattern, e))
        })?;
        if rule.lookup_query.sql.trim().is_empty() {
            return Err(MigrateError::Config(format!(
                "lookup_query.sql for '{}' is empty",
                rule.pattern
            )));
        }
        validate_selection(&rule.pattern, &rule.selection)?;
    }

    Ok(())
}

fn validate_selection(owner: &str, selection: &SelectionConfig) -> Result<()> {
    if selection.mode == SelectionMode::Tables && selection.tables.is_empty() {
        return Err(MigrateError::Config(format!(
            "'{}' uses mode 'tables' but lists no tables",
            owner
        )));
    }

    for table in &selection.tables {
        validate_identifier(table.name())
            .map_err(|e| MigrateError::Config(format!("'{}' tables[]: {}", owner, e)))?;
        if let Some(predicate) = table.where_clause() {
            validate_predicate(predicate)?;
        }
    }

    if let Some(predicate) = &selection.where_clause {
        validate_predicate(predicate)?;
    }

    if let Some(scope) = &selection.row_scope {
        validate_identifier(&scope.column)
            .map_err(|e| MigrateError::Config(format!("'{}' row_scope.column: {}", owner, e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseSpec, DynamicDatabaseRule, LookupQuery};

    fn valid_config() -> RunConfig {
        RunConfig {
            databases: vec![DatabaseSpec::new("shop")],
            ..RunConfig::default()
        }
    }

    fn dynamic(pattern: &str) -> DynamicDatabaseRule {
        DynamicDatabaseRule {
            pattern: pattern.to_string(),
            lookup_query: LookupQuery {
                database: "control".into(),
                sql: "SELECT id FROM tenants".into(),
            },
            target_pattern: None,
            selection: SelectionConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_requires_databases() {
        let config = RunConfig::default();
        assert!(validate(&config).unwrap_err().is_config());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_database_name() {
        let mut config = valid_config();
        config.databases.push(DatabaseSpec::new(""));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_tables_mode_without_tables() {
        let mut config = valid_config();
        config.databases[0].selection.mode = SelectionMode::Tables;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_dynamic_pattern_placeholders() {
        let mut config = valid_config();
        config.dynamic_databases.push(dynamic("tenant_{id}"));
        assert!(validate(&config).is_ok());

        config.dynamic_databases[0] = dynamic("tenant");
        assert!(validate(&config).unwrap_err().is_config());

        config.dynamic_databases[0] = dynamic("tenant_{id}_{region}");
        assert!(validate(&config).unwrap_err().is_config());
    }

    #[test]
    fn test_dynamic_target_pattern_token_must_match() {
        let mut config = valid_config();
        let mut rule = dynamic("tenant_{id}");
        rule.target_pattern = Some("copy_{tenant}".into());
        config.dynamic_databases.push(rule);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let config = crate::config::ConnectionConfig {
            password: "super_secret_password_123".to_string(),
            ..Default::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
