//! Table selection by include/exclude glob patterns.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{MigrateError, Result};

/// Matches table names against include and exclude globs.
///
/// Matching is case-insensitive. An empty include list selects every table;
/// exclusion always wins over inclusion.
#[derive(Debug, Clone)]
pub struct TableFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl TableFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include, "include_tables")?,
            exclude: build_set(exclude, "exclude_tables")?,
        })
    }

    /// A filter that selects every table.
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    pub fn matches(&self, table: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(table) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(table),
            None => true,
        }
    }

    /// Keep the matching names, preserving order.
    pub fn apply<'a, I>(&self, tables: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tables
            .into_iter()
            .filter(|t| self.matches(t))
            .cloned()
            .collect()
    }
}

fn build_set(patterns: &[String], field: &str) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                MigrateError::Config(format!(
                    "migration.{}: invalid pattern '{}': {}",
                    field, pattern, e
                ))
            })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| MigrateError::Config(format!("migration.{}: {}", field, e)))?;
    Ok(Some(set))
}
