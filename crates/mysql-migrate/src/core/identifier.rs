//! Identifier validation and quoting for dynamically built MySQL statements.
//!
//! Table, column and database names cannot be bound as statement parameters,
//! so every name that ends up in generated SQL goes through this module:
//!
//! 1. Validate the identifier (non-empty, no null bytes, bounded length)
//! 2. Wrap it in backticks
//! 3. Escape embedded backticks by doubling them

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted. MySQL itself caps names at 64
/// characters; generated names from dynamic patterns are checked against
/// the same ceiling before any connection is opened.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier for security issues.
///
/// # Errors
///
/// Returns `MigrateError::Config` for empty, overlong, or null-byte names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}

/// Validate a user-supplied WHERE predicate.
///
/// Predicates are spliced into the source SELECT verbatim, so only a single
/// expression is allowed: statement separators are rejected.
pub fn validate_predicate(predicate: &str) -> Result<()> {
    if predicate.contains(';') {
        return Err(MigrateError::Config(format!(
            "WHERE predicate must be a single expression (found ';'): {:?}",
            predicate
        )));
    }
    if predicate.contains('\0') {
        return Err(MigrateError::Config(format!(
            "WHERE predicate contains null byte: {:?}",
            predicate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("tenant_42").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_boundary() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let result = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1));
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("a`b`c").unwrap(), "`a``b``c`");
    }

    #[test]
    fn test_quote_mysql_sql_injection_safely_quoted() {
        let result = quote_mysql("Robert`); DROP TABLE Students;--").unwrap();
        assert_eq!(result, "`Robert``); DROP TABLE Students;--`");
    }

    #[test]
    fn test_qualify_mysql() {
        assert_eq!(qualify_mysql("shop", "orders").unwrap(), "`shop`.`orders`");
        assert!(qualify_mysql("", "orders").is_err());
        assert!(qualify_mysql("shop", "bad\0name").is_err());
    }

    #[test]
    fn test_validate_predicate() {
        assert!(validate_predicate("created_at >= '2024-01-01'").is_ok());
        assert!(validate_predicate("id > 0; DROP TABLE users").is_err());
    }
}
