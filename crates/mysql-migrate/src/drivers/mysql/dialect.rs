//! MySQL statement builders.
//!
//! Every identifier goes through [`quote_mysql`]; predicates are spliced
//! verbatim after [`validate_predicate`].

use crate::core::identifier::{qualify_mysql, quote_mysql, validate_predicate};
use crate::core::{Column, Table};
use crate::error::Result;

/// MySQL caps a prepared statement at 65535 placeholders.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Rows per INSERT so the statement stays under [`MAX_PLACEHOLDERS`].
pub fn max_rows_per_statement(column_count: usize) -> usize {
    (MAX_PLACEHOLDERS / column_count.max(1)).max(1)
}

/// Streaming SELECT for one table.
pub fn build_select(
    database: &str,
    table: &str,
    columns: &[Column],
    where_clause: Option<&str>,
    limit: Option<u64>,
) -> Result<String> {
    let col_list = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| quote_mysql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", col_list, qualify_mysql(database, table)?);

    if let Some(predicate) = where_clause.map(str::trim).filter(|p| !p.is_empty()) {
        validate_predicate(predicate)?;
        sql.push_str(&format!(" WHERE ({})", predicate));
    }

    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(sql)
}

/// Multi-row `INSERT IGNORE` with `rows` placeholder groups.
pub fn build_insert_ignore(
    database: &str,
    table: &str,
    columns: &[String],
    rows: usize,
) -> Result<String> {
    let col_list = columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![row_placeholders; rows].join(", ");

    Ok(format!(
        "INSERT IGNORE INTO {} ({}) VALUES {}",
        qualify_mysql(database, table)?,
        col_list,
        values
    ))
}

/// `CREATE TABLE` replicating column types, nullability, and primary key.
///
/// Foreign keys, secondary indexes, and defaults are not replicated.
pub fn build_create_table(database: &str, target_name: &str, source: &Table) -> Result<String> {
    let mut defs = Vec::with_capacity(source.columns.len() + 1);

    for col in &source.columns {
        let mut def = format!("{} {}", quote_mysql(&col.name)?, col.column_type);
        if !col.is_nullable {
            def.push_str(" NOT NULL");
        }
        // AUTO_INCREMENT must lead an index, and only the primary key is copied
        if col.is_identity && source.primary_key.first() == Some(&col.name) {
            def.push_str(" AUTO_INCREMENT");
        }
        defs.push(def);
    }

    if source.has_pk() {
        let pk_cols = source
            .primary_key
            .iter()
            .map(|c| quote_mysql(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        defs.push(format!("PRIMARY KEY ({})", pk_cols));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
        qualify_mysql(database, target_name)?,
        defs.join(",\n    ")
    ))
}

pub fn build_truncate(database: &str, table: &str) -> Result<String> {
    Ok(format!("TRUNCATE TABLE {}", qualify_mysql(database, table)?))
}

pub fn build_create_database(database: &str) -> Result<String> {
    Ok(format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        quote_mysql(database)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, column_type: &str, nullable: bool, identity: bool) -> Column {
        Column {
            name: name.into(),
            data_type: column_type
                .split(|c: char| c == '(' || c == ' ')
                .next()
                .unwrap()
                .into(),
            column_type: column_type.into(),
            is_nullable: nullable,
            is_identity: identity,
            ordinal_pos: 0,
        }
    }

    #[test]
    fn test_build_select() {
        let columns = vec![col("id", "int(11)", false, true), col("na`me", "varchar(20)", true, false)];

        assert_eq!(
            build_select("shop", "orders", &columns, None, None).unwrap(),
            "SELECT `id`, `na``me` FROM `shop`.`orders`"
        );
        assert_eq!(
            build_select("shop", "orders", &columns, Some("id > 5 OR id < 2"), Some(100)).unwrap(),
            "SELECT `id`, `na``me` FROM `shop`.`orders` WHERE (id > 5 OR id < 2) LIMIT 100"
        );
        assert!(build_select("shop", "orders", &columns, Some("1; DROP TABLE x"), None).is_err());
    }

    #[test]
    fn test_build_insert_ignore() {
        let sql = build_insert_ignore("shop", "orders", &["id".into(), "total".into()], 2).unwrap();
        assert_eq!(
            sql,
            "INSERT IGNORE INTO `shop`.`orders` (`id`, `total`) VALUES (?, ?), (?, ?)"
        );
    }

    #[test]
    fn test_max_rows_per_statement() {
        assert_eq!(max_rows_per_statement(1), 65_535);
        assert_eq!(max_rows_per_statement(10), 6_553);
        assert_eq!(max_rows_per_statement(0), 65_535);
        assert_eq!(max_rows_per_statement(70_000), 1);
    }

    #[test]
    fn test_build_create_table() {
        let mut table = Table::new("shop", "orders");
        table.columns.push(col("id", "bigint(20) unsigned", false, true));
        table.columns.push(col("status", "enum('new','paid')", true, false));
        table.primary_key.push("id".into());

        let ddl = build_create_table("shop_copy", "orders", &table).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `shop_copy`.`orders`"));
        assert!(ddl.contains("`id` bigint(20) unsigned NOT NULL AUTO_INCREMENT"));
        assert!(ddl.contains("`status` enum('new','paid')"));
        assert!(ddl.contains("PRIMARY KEY (`id`)"));
        assert!(ddl.contains("ENGINE=InnoDB"));
        assert!(!ddl.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_build_create_table_without_pk() {
        let mut table = Table::new("shop", "log");
        table.columns.push(col("seq", "int(11)", false, true));

        let ddl = build_create_table("shop", "log", &table).unwrap();
        assert!(ddl.contains("`seq` int(11) NOT NULL"));
        assert!(!ddl.contains("AUTO_INCREMENT"));
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_build_create_table_identity_not_leading_pk() {
        let mut table = Table::new("saas", "invoices");
        table.columns.push(col("tenant_id", "int(11)", false, false));
        table.columns.push(col("id", "bigint(20)", false, true));
        table.primary_key = vec!["tenant_id".into(), "id".into()];

        let ddl = build_create_table("saas", "invoices", &table).unwrap();
        assert!(ddl.contains("`id` bigint(20) NOT NULL,"));
        assert!(!ddl.contains("AUTO_INCREMENT"));
        assert!(ddl.contains("PRIMARY KEY (`tenant_id`, `id`)"));
    }

    #[test]
    fn test_misc_statements() {
        assert_eq!(build_truncate("shop", "orders").unwrap(), "TRUNCATE TABLE `shop`.`orders`");
        assert!(build_create_database("tenant_5")
            .unwrap()
            .starts_with("CREATE DATABASE IF NOT EXISTS `tenant_5` CHARACTER SET utf8mb4"));
    }
}
