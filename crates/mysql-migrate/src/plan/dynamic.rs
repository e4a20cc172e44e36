//! Dynamic database expansion.
//!
//! A rule like `tenant_{id}` plus a lookup query returning `{5, 7}` expands
//! into the databases `tenant_5` and `tenant_7`. Expansion is a pure
//! function of the rule and the lookup rows; running the lookup itself is
//! the orchestrator's job.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{DatabaseSpec, DynamicDatabaseRule};
use crate::core::identifier::validate_identifier;
use crate::core::{LookupResult, SqlValue};
use crate::error::{MigrateError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is a valid regex"));

/// A database name pattern with exactly one `{token}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    pattern: String,
    token: String,
}

impl NamePattern {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// `MigrateError::Config` unless the pattern holds exactly one placeholder.
    pub fn parse(pattern: &str) -> Result<Self> {
        let tokens: Vec<&str> = PLACEHOLDER
            .captures_iter(pattern)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        match tokens.as_slice() {
            [token] => Ok(Self {
                pattern: pattern.to_string(),
                token: token.to_string(),
            }),
            [] => Err(MigrateError::Config(format!(
                "pattern '{}' has no {{placeholder}}",
                pattern
            ))),
            _ => Err(MigrateError::Config(format!(
                "pattern '{}' has {} placeholders; exactly one is allowed",
                pattern,
                tokens.len()
            ))),
        }
    }

    /// Placeholder name, without braces.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Substitute a value for the placeholder.
    pub fn render(&self, value: &str) -> String {
        self.pattern
            .replacen(&format!("{{{}}}", self.token), value, 1)
    }
}

/// Text form of a lookup value; `None` for NULL.
fn lookup_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Int(v) => Some(v.to_string()),
        SqlValue::UInt(v) => Some(v.to_string()),
        SqlValue::Float(v) => Some(v.to_string()),
        SqlValue::Double(v) => Some(v.to_string()),
        SqlValue::Decimal(v) => Some(v.normalize().to_string()),
        SqlValue::Text(v) => Some(v.clone()),
        SqlValue::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
        SqlValue::Date(v) => Some(v.format("%Y%m%d").to_string()),
        SqlValue::Time(v) => Some(v.to_string()),
        SqlValue::DateTime(v) => Some(v.to_string()),
    }
}

/// Expand a rule over lookup rows into one [`DatabaseSpec`] per distinct
/// generated name, in first-seen order.
///
/// # Errors
///
/// `MigrateError::Config` for a malformed pattern, a target pattern using a
/// different placeholder, a lookup result with other than one column, or a
/// generated name that is not a valid identifier.
pub fn expand_rule(rule: &DynamicDatabaseRule, lookup: &LookupResult) -> Result<Vec<DatabaseSpec>> {
    let source = NamePattern::parse(&rule.pattern)?;
    let target = rule
        .target_pattern
        .as_deref()
        .map(NamePattern::parse)
        .transpose()?;

    if let Some(target) = &target {
        if target.token() != source.token() {
            return Err(MigrateError::Config(format!(
                "target_pattern '{}' must use the same placeholder as '{}'",
                rule.target_pattern.as_deref().unwrap_or_default(),
                rule.pattern
            )));
        }
    }

    // Checked before rows so a wrong projection fails even on an empty result
    if lookup.columns.len() != 1 {
        return Err(MigrateError::Config(format!(
            "lookup query for '{}' must return exactly one column, got {} ({})",
            rule.pattern,
            lookup.columns.len(),
            lookup.columns.join(", ")
        )));
    }

    if lookup.rows.is_empty() {
        warn!(
            "Lookup query for '{}' returned no rows; no databases generated",
            rule.pattern
        );
        return Ok(Vec::new());
    }

    let mut nulls = 0usize;
    let mut seen = HashSet::new();
    let mut specs = Vec::new();

    for row in &lookup.rows {
        let Some(value) = row.first().and_then(lookup_text) else {
            nulls += 1;
            continue;
        };

        let name = source.render(&value);
        if !seen.insert(name.clone()) {
            continue;
        }
        validate_identifier(&name)?;

        let target_name = match &target {
            Some(pattern) => {
                let rendered = pattern.render(&value);
                validate_identifier(&rendered)?;
                Some(rendered)
            }
            None => None,
        };

        specs.push(DatabaseSpec {
            name,
            target_name,
            selection: rule.selection.clone(),
        });
    }

    if nulls > 0 {
        warn!(
            "Lookup query for '{}' returned {} NULL value(s); skipped",
            rule.pattern, nulls
        );
    }
    debug!("Pattern '{}' expanded to {} database(s)", rule.pattern, specs.len());

    Ok(specs)
}

/// Append generated databases to the static list.
///
/// Keyed by target database: a generated spec copying the same source into
/// an already-targeted database is dropped as a duplicate; one copying a
/// different source into it is a configuration error.
pub fn merge_databases(
    statics: Vec<DatabaseSpec>,
    generated: Vec<DatabaseSpec>,
) -> Result<Vec<DatabaseSpec>> {
    let mut by_target: HashMap<String, String> = statics
        .iter()
        .map(|db| (db.target_database().to_string(), db.name.clone()))
        .collect();
    let mut merged = statics;

    for db in generated {
        match by_target.get(db.target_database()) {
            Some(source) if *source == db.name => {
                debug!("Database '{}' already configured; skipping duplicate", db.name);
            }
            Some(source) => {
                return Err(MigrateError::Config(format!(
                    "generated database '{}' targets '{}', which is already the target of '{}'",
                    db.name,
                    db.target_database(),
                    source
                )));
            }
            None => {
                by_target.insert(db.target_database().to_string(), db.name.clone());
                merged.push(db);
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LookupQuery, SelectionConfig, SelectionMode};

    fn rule(pattern: &str) -> DynamicDatabaseRule {
        DynamicDatabaseRule {
            pattern: pattern.to_string(),
            lookup_query: LookupQuery {
                database: "control".into(),
                sql: "SELECT id FROM tenants".into(),
            },
            target_pattern: None,
            selection: SelectionConfig {
                mode: SelectionMode::Tables,
                tables: vec!["users".into()],
                exclude: vec!["audit".into()],
                ..SelectionConfig::default()
            },
        }
    }

    fn rows(values: Vec<SqlValue>) -> LookupResult {
        LookupResult {
            columns: vec!["id".into()],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    #[test]
    fn test_pattern_parse() {
        let pattern = NamePattern::parse("tenant_{id}").unwrap();
        assert_eq!(pattern.token(), "id");
        assert_eq!(pattern.render("5"), "tenant_5");

        assert!(NamePattern::parse("tenant").unwrap_err().is_config());
        assert!(NamePattern::parse("t_{a}_{b}").unwrap_err().is_config());
    }

    #[test]
    fn test_expand_two_values() {
        let specs = expand_rule(
            &rule("tenant_{id}"),
            &rows(vec![SqlValue::Int(5), SqlValue::Int(7)]),
        )
        .unwrap();

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["tenant_5", "tenant_7"]);
        for spec in &specs {
            assert_eq!(spec.selection.mode, SelectionMode::Tables);
            assert_eq!(spec.selection.exclude, vec!["audit".to_string()]);
            assert_eq!(spec.target_database(), spec.name);
        }
    }

    #[test]
    fn test_expand_skips_nulls_and_duplicates() {
        let specs = expand_rule(
            &rule("tenant_{id}"),
            &rows(vec![
                SqlValue::Int(7),
                SqlValue::Null,
                SqlValue::Text("5".into()),
                SqlValue::UInt(7),
            ]),
        )
        .unwrap();

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["tenant_7", "tenant_5"]);
    }

    #[test]
    fn test_expand_target_pattern() {
        let mut r = rule("tenant_{id}");
        r.target_pattern = Some("archive_tenant_{id}".into());
        let specs = expand_rule(&r, &rows(vec![SqlValue::Int(5)])).unwrap();
        assert_eq!(specs[0].target_database(), "archive_tenant_5");

        r.target_pattern = Some("archive_{other}".into());
        assert!(expand_rule(&r, &rows(vec![SqlValue::Int(5)]))
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_expand_rejects_multi_column_lookup() {
        let lookup = LookupResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![SqlValue::Int(5), SqlValue::Text("acme".into())]],
        };
        let err = expand_rule(&rule("tenant_{id}"), &lookup).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("exactly one column"));
    }

    #[test]
    fn test_expand_empty_lookup_yields_nothing() {
        let specs = expand_rule(&rule("tenant_{id}"), &rows(Vec::new())).unwrap();
        assert!(specs.is_empty());
    }

    #[test]
    fn test_expand_rejects_multi_column_lookup_without_rows() {
        let lookup = LookupResult {
            columns: vec!["id".into(), "name".into()],
            rows: Vec::new(),
        };
        let err = expand_rule(&rule("tenant_{id}"), &lookup).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_merge_dedupes_identical_targets() {
        let statics = vec![DatabaseSpec::new("tenant_5")];
        let generated = vec![DatabaseSpec::new("tenant_5"), DatabaseSpec::new("tenant_7")];
        let merged = merge_databases(statics, generated).unwrap();

        let names: Vec<&str> = merged.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["tenant_5", "tenant_7"]);
    }

    #[test]
    fn test_merge_rejects_conflicting_targets() {
        let mut fixed = DatabaseSpec::new("legacy");
        fixed.target_name = Some("tenant_5".into());
        let err = merge_databases(vec![fixed], vec![DatabaseSpec::new("tenant_5")]).unwrap_err();
        assert!(err.is_config());
    }
}
