//! Migration planning.
//!
//! A plan is built in three pure steps, each in its own module:
//!
//! - [`selector`]: live table list + selection settings -> [`TableSpec`]s
//! - [`dependency`]: foreign-key edges -> total order and strata
//! - [`dynamic`]: lookup values -> additional [`DatabaseSpec`]s
//!
//! [`DatabaseSpec`]: crate::config::DatabaseSpec

pub mod dependency;
pub mod dynamic;
pub mod selector;

use serde::{Deserialize, Serialize};

use crate::config::RowScope;
use crate::core::Table;

pub use dependency::{resolve, Resolution};
pub use dynamic::{expand_rule, merge_databases, NamePattern};
pub use selector::{is_date_suffixed, select_tables, SelectionInput};

/// One table to copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source database.
    pub database: String,

    /// Source table.
    pub name: String,

    /// Target table (same as `name` unless renamed).
    pub target_name: String,

    /// WHERE predicate applied to the source read.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,

    /// Maximum rows read from the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Target database.
    pub target_database: String,
}

impl TableSpec {
    /// `database.table` on the source side.
    pub fn source_full_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// `database.table` on the target side.
    pub fn target_full_name(&self) -> String {
        format!("{}.{}", self.target_database, self.target_name)
    }

    /// AND a row-scope filter onto the predicate if the table has its column.
    ///
    /// Returns whether the filter was applied.
    pub fn apply_row_scope(&mut self, scope: &RowScope, table: &Table) -> bool {
        if !table.has_column(&scope.column) {
            return false;
        }

        let filter = if scope.values.is_empty() {
            // IN () is a syntax error; an empty scope matches nothing
            "1 = 0".to_string()
        } else {
            let values: Vec<String> = scope.values.iter().map(|v| v.to_string()).collect();
            format!("`{}` IN ({})", scope.column.replace('`', "``"), values.join(", "))
        };

        self.where_clause = Some(combine_predicates(self.where_clause.as_deref(), &filter));
        true
    }
}

/// Normalize a predicate: blank text means "no predicate".
pub fn normalize_predicate(predicate: Option<&str>) -> Option<String> {
    predicate
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// AND two predicates, parenthesising the existing one.
pub fn combine_predicates(existing: Option<&str>, extra: &str) -> String {
    match normalize_predicate(existing) {
        Some(existing) => format!("({}) AND {}", existing, extra),
        None => extra.to_string(),
    }
}

/// A database-scoped, dependency-ordered set of tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Source database.
    pub database: String,

    /// Target database.
    pub target_database: String,

    /// Tables in resolved migration order.
    pub tables: Vec<TableSpec>,

    /// Indices into `tables`, grouped by topological depth. Every table of
    /// stratum `d` finishes before any table of stratum `d + 1` starts.
    pub strata: Vec<Vec<usize>>,

    pub auto_order: bool,
    pub truncate: bool,
    pub create_tables: bool,
    pub exclude_date_tables: bool,

    /// Set when a foreign-key cycle forced a fallback order.
    pub unordered_fallback: bool,

    /// Tables placed by the fallback, in selection order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unordered_tables: Vec<String>,
}

impl MigrationPlan {
    /// Tables of each stratum, in dispatch order.
    pub fn stratum_specs(&self) -> impl Iterator<Item = Vec<&TableSpec>> + '_ {
        self.strata
            .iter()
            .map(|stratum| stratum.iter().filter_map(|&i| self.tables.get(i)).collect())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Plan-wide flags copied onto every [`MigrationPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanFlags {
    pub auto_order: bool,
    pub truncate: bool,
    pub create_tables: bool,
    pub exclude_date_tables: bool,
}

/// Order `specs` with `resolution` and assemble the plan.
pub fn build_plan(
    database: &str,
    target_database: &str,
    specs: Vec<TableSpec>,
    resolution: Resolution,
    flags: PlanFlags,
) -> MigrationPlan {
    // Re-index strata from selection positions to ordered positions
    let mut position = vec![0usize; specs.len()];
    for (ordered, &selected) in resolution.order.iter().enumerate() {
        position[selected] = ordered;
    }
    let strata = resolution
        .strata
        .iter()
        .map(|stratum| {
            let mut indices: Vec<usize> = stratum.iter().map(|&i| position[i]).collect();
            indices.sort_unstable();
            indices
        })
        .collect();

    let unordered_tables = resolution
        .unordered
        .iter()
        .filter_map(|&i| specs.get(i).map(|s| s.name.clone()))
        .collect();

    let mut slots: Vec<Option<TableSpec>> = specs.into_iter().map(Some).collect();
    let tables = resolution
        .order
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect();

    MigrationPlan {
        database: database.to_string(),
        target_database: target_database.to_string(),
        tables,
        strata,
        auto_order: flags.auto_order,
        truncate: flags.truncate,
        create_tables: flags.create_tables,
        exclude_date_tables: flags.exclude_date_tables,
        unordered_fallback: resolution.unordered_fallback,
        unordered_tables,
    }
}
