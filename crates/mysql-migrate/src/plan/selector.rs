//! Table selection.
//!
//! Turns a database's live table list and its selection settings into the
//! [`TableSpec`]s to copy. Selection runs before any row is touched, so an
//! unknown explicitly named table fails the database up front.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::{SelectionConfig, SelectionMode, TableOverride};
use crate::core::identifier::validate_predicate;
use crate::error::{MigrateError, Result};

use super::{normalize_predicate, TableSpec};

/// Date-shaped name endings: `20240101`, `240101`, `_2024_01_01`, `_2024-01-01`.
/// Purely lexical; `_99999999` matches too.
static DATE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{8}|\d{6}|_\d{4}_\d{2}_\d{2}|_\d{4}-\d{2}-\d{2})$")
        .expect("date suffix pattern is a valid regex")
});

/// Whether a table name ends in a date-shaped token.
pub fn is_date_suffixed(table: &str) -> bool {
    DATE_SUFFIX.is_match(table)
}

/// Everything selection needs for one database.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    /// Source database.
    pub database: &'a str,
    /// Target database.
    pub target_database: &'a str,
    /// Base tables in catalog order.
    pub live_tables: &'a [String],
    /// Mode, excludes, overrides, and default where/limit.
    pub selection: &'a SelectionConfig,
    /// Effective date-suffix flag (database override or global).
    pub exclude_date_tables: bool,
}

/// Resolve the tables to copy.
///
/// # Errors
///
/// `MigrateError::Config` if a table named in `tables` is missing from the
/// live catalog, if `tables` mode has an empty list, or if a predicate is
/// not a single expression.
pub fn select_tables(input: SelectionInput<'_>) -> Result<Vec<TableSpec>> {
    let selection = input.selection;
    let live: HashSet<&str> = input.live_tables.iter().map(String::as_str).collect();
    let excluded: HashSet<&str> = selection.exclude.iter().map(String::as_str).collect();

    for entry in &selection.tables {
        if !live.contains(entry.name()) {
            return Err(MigrateError::Config(format!(
                "table '{}' not found in source database '{}'",
                entry.name(),
                input.database
            )));
        }
    }

    let names: Vec<&str> = match selection.mode {
        SelectionMode::All => {
            let named: HashSet<&str> = selection.tables.iter().map(TableOverride::name).collect();
            let mut date_skipped = 0usize;

            let names: Vec<&str> = input
                .live_tables
                .iter()
                .map(String::as_str)
                .filter(|name| {
                    let skip = input.exclude_date_tables
                        && !named.contains(name)
                        && is_date_suffixed(name);
                    if skip {
                        date_skipped += 1;
                    }
                    !skip
                })
                .collect();

            if date_skipped > 0 {
                info!(
                    "{}: excluded {} date-suffixed table(s)",
                    input.database, date_skipped
                );
            }
            names
        }
        SelectionMode::Tables => {
            if selection.tables.is_empty() {
                return Err(MigrateError::Config(format!(
                    "database '{}' uses mode 'tables' but lists no tables",
                    input.database
                )));
            }
            let mut seen = HashSet::new();
            selection
                .tables
                .iter()
                .map(TableOverride::name)
                .filter(|name| seen.insert(*name))
                .collect()
        }
    };

    let before_exclude = names.len();
    let names: Vec<&str> = names
        .into_iter()
        .filter(|name| !excluded.contains(name))
        .collect();
    if before_exclude != names.len() {
        debug!(
            "{}: excluded {} table(s) by name",
            input.database,
            before_exclude - names.len()
        );
    }

    let specs = names
        .into_iter()
        .map(|name| build_spec(&input, name))
        .collect::<Result<Vec<_>>>()?;

    info!(
        "{}: selected {}/{} table(s)",
        input.database,
        specs.len(),
        input.live_tables.len()
    );
    Ok(specs)
}

fn build_spec(input: &SelectionInput<'_>, name: &str) -> Result<TableSpec> {
    let selection = input.selection;
    // First entry wins when a table is listed twice
    let entry = selection.tables.iter().find(|t| t.name() == name);

    let where_clause = normalize_predicate(entry.and_then(TableOverride::where_clause))
        .or_else(|| normalize_predicate(selection.where_clause.as_deref()));
    if let Some(predicate) = &where_clause {
        validate_predicate(predicate)?;
    }

    let limit = entry
        .and_then(TableOverride::limit)
        .or(selection.limit);

    Ok(TableSpec {
        database: input.database.to_string(),
        name: name.to_string(),
        target_name: name.to_string(),
        where_clause,
        limit,
        target_database: input.target_database.to_string(),
    })
}
