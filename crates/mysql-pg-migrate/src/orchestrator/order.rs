//! Foreign-key dependency ordering.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::core::TableSpec;

/// Order tables so that every referenced table comes before the tables that
/// reference it.
///
/// Ties are broken alphabetically. Self-references and references to tables
/// outside `specs` are ignored. Tables caught in a cycle are appended in
/// alphabetical order after everything else.
pub fn dependency_order(specs: &[TableSpec]) -> Vec<String> {
    let known: BTreeMap<String, &str> = specs
        .iter()
        .map(|s| (s.name.to_lowercase(), s.name.as_str()))
        .collect();

    // table -> tables it waits for
    let mut waits_on: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    // table -> tables waiting for it
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for spec in specs {
        let entry = waits_on.entry(spec.name.as_str()).or_default();
        for referenced in spec.referenced_tables() {
            let Some(&parent) = known.get(&referenced.to_lowercase()) else {
                continue;
            };
            if parent == spec.name {
                continue;
            }
            entry.insert(parent);
            dependents.entry(parent).or_default().insert(spec.name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = waits_on
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(specs.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.to_string());
        waits_on.remove(next);
        if let Some(children) = dependents.get(next) {
            for child in children {
                if let Some(deps) = waits_on.get_mut(child) {
                    deps.remove(next);
                    if deps.is_empty() {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    if !waits_on.is_empty() {
        let cyclic: Vec<&str> = waits_on.keys().copied().collect();
        warn!(
            "Foreign key cycle between {}; appending in name order",
            cyclic.join(", ")
        );
        order.extend(cyclic.into_iter().map(str::to_string));
    }
    order
}
