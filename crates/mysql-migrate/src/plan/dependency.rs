//! Foreign-key dependency resolution.
//!
//! Orders tables so every referenced (parent) table comes before the tables
//! referencing it, and groups them into strata by topological depth.
//! Cycles are not an error: the tables that cannot be ordered are appended
//! in selection order as one final stratum and the resolution is flagged.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::core::ForeignKeyEdge;

/// Result of ordering one database's selected tables.
///
/// All indices refer to positions in the input table slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Total migration order.
    pub order: Vec<usize>,

    /// Tables grouped by depth, each group in selection order.
    pub strata: Vec<Vec<usize>>,

    /// Tables left over by a cycle, in selection order.
    pub unordered: Vec<usize>,

    /// Whether a cycle forced the fallback.
    pub unordered_fallback: bool,
}

impl Resolution {
    /// Selection order verbatim, dispatched as one stratum.
    pub fn unresolved(count: usize) -> Self {
        let order: Vec<usize> = (0..count).collect();
        let strata = if count == 0 {
            Vec::new()
        } else {
            vec![order.clone()]
        };
        Self {
            order,
            strata,
            unordered: Vec::new(),
            unordered_fallback: false,
        }
    }
}

/// Resolve migration order with Kahn's algorithm.
///
/// Among tables whose parents are all placed, the earliest in `tables`
/// wins, so the result is deterministic. Edges with an endpoint outside
/// `tables` and self-references are ignored.
pub fn resolve(tables: &[String], edges: &[ForeignKeyEdge]) -> Resolution {
    let count = tables.len();
    let index: HashMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    let mut seen = HashSet::new();

    for edge in edges.iter().filter(|e| !e.is_self_reference()) {
        let (Some(&child), Some(&parent)) = (
            index.get(edge.child.as_str()),
            index.get(edge.parent.as_str()),
        ) else {
            continue;
        };
        // Composite or repeated constraints collapse to one edge
        if !seen.insert((child, parent)) {
            continue;
        }
        children[parent].push(child);
        parents[child].push(parent);
        in_degree[child] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    let mut depth: Vec<Option<usize>> = vec![None; count];

    while let Some(current) = ready.pop_first() {
        order.push(current);
        depth[current] = Some(
            parents[current]
                .iter()
                .filter_map(|&p| depth[p])
                .map(|d| d + 1)
                .max()
                .unwrap_or(0),
        );

        for &child in &children[current] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    let max_depth = depth.iter().flatten().max().copied();
    let mut strata: Vec<Vec<usize>> = match max_depth {
        Some(max) => vec![Vec::new(); max + 1],
        None => Vec::new(),
    };
    for (i, d) in depth.iter().enumerate() {
        if let Some(d) = d {
            strata[*d].push(i);
        }
    }

    let unordered: Vec<usize> = (0..count).filter(|&i| depth[i].is_none()).collect();
    let unordered_fallback = !unordered.is_empty();
    if unordered_fallback {
        let names: Vec<&str> = unordered.iter().map(|&i| tables[i].as_str()).collect();
        warn!(
            "Foreign-key cycle detected; appending {} table(s) in selection order: {}",
            names.len(),
            names.join(", ")
        );
        order.extend(&unordered);
        strata.push(unordered.clone());
    }

    Resolution {
        order,
        strata,
        unordered,
        unordered_fallback,
    }
}
