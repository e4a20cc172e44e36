//! Catalog metadata: tables, columns, and foreign-key edges.

use serde::{Deserialize, Serialize};

/// Table metadata as introspected from the source catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Database (MySQL schema) name.
    pub database: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
}

impl Table {
    /// Create an empty table definition.
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Get the fully qualified table name (`database.table`).
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether the table has a column with this name (case-insensitive, as MySQL compares).
    pub fn has_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Base data type (`int`, `varchar`, `datetime`, ...), lowercase.
    pub data_type: String,

    /// Full column type as declared (`int(10) unsigned`, `varchar(255)`, `enum('a','b')`).
    /// Replicated verbatim into target DDL.
    pub column_type: String,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Whether the column is `AUTO_INCREMENT`.
    pub is_identity: bool,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Whether the declared type carries the `unsigned` attribute.
    pub fn is_unsigned(&self) -> bool {
        self.column_type.to_ascii_lowercase().contains("unsigned")
    }
}

/// A foreign-key dependency between two tables of the same database.
///
/// The parent must be fully migrated before the child's first batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    /// Referencing table.
    pub child: String,

    /// Referenced table.
    pub parent: String,
}

impl ForeignKeyEdge {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }

    /// Self-references never constrain ordering.
    pub fn is_self_reference(&self) -> bool {
        self.child == self.parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, column_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: column_type
                .split(|c: char| c == '(' || c == ' ')
                .next()
                .unwrap_or_default()
                .to_string(),
            column_type: column_type.to_string(),
            is_nullable: true,
            is_identity: false,
            ordinal_pos: 1,
        }
    }

    #[test]
    fn test_table_full_name_and_columns() {
        let mut table = Table::new("shop", "orders");
        table.columns.push(column("id", "bigint(20) unsigned"));
        table.columns.push(column("UserId", "int(11)"));

        assert_eq!(table.full_name(), "shop.orders");
        assert_eq!(table.column_names(), vec!["id", "UserId"]);
        assert!(!table.has_column("user_id"));
        assert!(table.has_column("userid"));
        assert!(!table.has_pk());
    }

    #[test]
    fn test_column_is_unsigned() {
        assert!(column("id", "bigint(20) unsigned").is_unsigned());
        assert!(column("id", "INT UNSIGNED").is_unsigned());
        assert!(!column("id", "int(11)").is_unsigned());
    }

    #[test]
    fn test_foreign_key_edge_self_reference() {
        assert!(ForeignKeyEdge::new("employees", "employees").is_self_reference());
        assert!(!ForeignKeyEdge::new("orders", "customers").is_self_reference());
    }
}
