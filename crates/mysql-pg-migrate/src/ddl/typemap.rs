//! MySQL → PostgreSQL column type rules.
//!
//! A [`TypeMapper`] is an ordered list of regex rules tried against the
//! normalized MySQL type; the first match wins. User rules from the
//! configuration go in front of the built-in table. Every built-in target
//! type maps to itself, so mapping is idempotent.

use regex::{Regex, RegexBuilder};

use crate::config::TypeMappingRule;
use crate::core::{ColumnSpec, TypeMapping};
use crate::error::{MigrateError, Result};

/// One rule: an anchored, case-insensitive pattern and its replacement.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pattern: Regex,
    replacement: String,
    warning: Option<String>,
}

impl ColumnMapping {
    /// Compile a rule. The pattern is anchored to the whole type.
    pub fn new(pattern: &str, replacement: &str, warning: Option<&str>) -> Result<Self> {
        let anchored = format!("^(?:{})$", pattern);
        let pattern = RegexBuilder::new(&anchored)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                MigrateError::Config(format!("invalid type pattern '{}': {}", pattern, e))
            })?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
            warning: warning.map(str::to_string),
        })
    }

    fn apply(&self, normalized: &str) -> Option<TypeMapping> {
        let caps = self.pattern.captures(normalized)?;
        let mut target = String::new();
        caps.expand(&self.replacement, &mut target);
        Some(match &self.warning {
            Some(w) => TypeMapping::lossy(target, w.clone()),
            None => TypeMapping::lossless(target),
        })
    }
}

const ENUM_WARNING: &str =
    "MySQL ENUM stored as text. Consider creating a CHECK constraint or PostgreSQL ENUM.";
const SET_WARNING: &str =
    "MySQL SET stored as text. Consider using an array type or separate table.";
const SPATIAL_WARNING: &str =
    "MySQL spatial type stored as text. Consider PostGIS for spatial operations.";

/// Built-in rules, most specific first.
const BUILTIN_RULES: &[(&str, &str, Option<&str>)] = &[
    // Boolean (MySQL uses TINYINT(1) for bool)
    (r"tinyint\(1\)(?: unsigned)?|bool|boolean|bit(?:\(1\))?", "BOOLEAN", None),
    // Unsigned integers widen to hold the full unsigned range
    (r"tinyint(?:\(\d+\))? unsigned", "SMALLINT", None),
    (r"(?:smallint|mediumint)(?:\(\d+\))? unsigned", "INTEGER", None),
    (r"(?:int|integer)(?:\(\d+\))? unsigned", "BIGINT", None),
    (r"bigint(?:\(\d+\))? unsigned", "DECIMAL(20)", None),
    // Integer types
    (r"(?:tinyint|smallint)(?:\(\d+\))?", "SMALLINT", None),
    (r"(?:mediumint|int|integer)(?:\(\d+\))?", "INTEGER", None),
    (r"(?:bigint|bit)(?:\(\d+\))?", "BIGINT", None),
    // Decimal/numeric
    (r"(?:decimal|numeric|dec|fixed)\((\d+),(\d+)\)", "DECIMAL(${1},${2})", None),
    (r"(?:decimal|numeric|dec|fixed)\((\d+)\)", "DECIMAL(${1})", None),
    (r"decimal|numeric|dec|fixed", "DECIMAL", None),
    // Floating point
    (r"float(?:\(\d+(?:,\d+)?\))?|real", "REAL", None),
    (r"double(?: precision)?(?:\(\d+,\d+\))?", "DOUBLE PRECISION", None),
    // String types
    (r"(?:varchar|character varying)\((\d+)\)", "VARCHAR(${1})", None),
    (r"(?:char|character)\((\d+)\)", "CHAR(${1})", None),
    (r"char|character", "CHAR", None),
    (r"(?:tinytext|text|mediumtext|longtext)(?:\(\d+\))?", "TEXT", None),
    // Binary types
    (
        r"(?:binary|varbinary)(?:\(\d+\))?|tinyblob|blob|mediumblob|longblob|bytea",
        "BYTEA",
        None,
    ),
    // Date/time types
    (r"(?:datetime|timestamp)\((\d)\)", "TIMESTAMP(${1})", None),
    (r"datetime|timestamp", "TIMESTAMP", None),
    (r"date", "DATE", None),
    (r"time\((\d)\)", "TIME(${1})", None),
    (r"time", "TIME", None),
    (r"year(?:\(\d\))?", "SMALLINT", None),
    // JSON
    (r"json|jsonb", "JSONB", None),
    // Lossy text fallbacks
    (r"enum\(.*\)", "TEXT", Some(ENUM_WARNING)),
    (r"set\(.*\)", "TEXT", Some(SET_WARNING)),
    (
        r"geometry|point|linestring|polygon|multipoint|multilinestring|multipolygon|geometrycollection|geomcollection",
        "TEXT",
        Some(SPATIAL_WARNING),
    ),
];

/// Ordered rule list mapping MySQL column types to PostgreSQL types.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    rules: Vec<ColumnMapping>,
}

impl TypeMapper {
    /// The built-in rule table.
    pub fn builtin() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(|(pattern, replacement, warning)| {
                ColumnMapping::new(pattern, replacement, *warning).ok()
            })
            .collect();
        Self { rules }
    }

    /// User rules first, then the built-in table.
    pub fn with_rules(custom: &[TypeMappingRule]) -> Result<Self> {
        let mut rules = custom
            .iter()
            .map(|r| ColumnMapping::new(&r.pattern, &r.replacement, r.warning.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        rules.extend(Self::builtin().rules);
        Ok(Self { rules })
    }

    /// Number of rules, custom and built-in.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Map a MySQL type. Unmatched types become lossy `TEXT`.
    ///
    /// The rules see `unsigned` as a trailing word; a type no rule claims in
    /// that form is retried without it.
    pub fn map(&self, source_type: &str) -> TypeMapping {
        let normalized = normalize_type(source_type);
        let signless = normalized.strip_suffix(" unsigned");
        self.rules
            .iter()
            .find_map(|rule| rule.apply(&normalized))
            .or_else(|| {
                signless.and_then(|base| self.rules.iter().find_map(|rule| rule.apply(base)))
            })
            .unwrap_or_else(|| {
                TypeMapping::lossy(
                    "TEXT",
                    format!("Unknown MySQL type '{}' stored as text.", source_type),
                )
            })
    }

    /// Map a column, honoring an explicit target type.
    pub fn map_column(&self, col: &ColumnSpec) -> TypeMapping {
        match &col.target_type {
            Some(explicit) => TypeMapping::lossless(explicit.clone()),
            None => self.map(&col.source_type),
        }
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase, drop `signed`/`zerofill`, move `unsigned` to the end and
/// collapse whitespace.
///
/// Whitespace next to parentheses and commas is removed outside quotes, so
/// `DECIMAL(10, 2) ZEROFILL UNSIGNED` becomes `decimal(10,2) unsigned`.
pub fn normalize_type(source_type: &str) -> String {
    let lower = source_type.trim().to_lowercase();
    let mut unsigned = false;
    let mut words: Vec<&str> = lower
        .split_whitespace()
        .filter(|w| match *w {
            "unsigned" => {
                unsigned = true;
                false
            }
            "signed" | "zerofill" => false,
            _ => true,
        })
        .collect();
    if unsigned {
        words.push("unsigned");
    }
    let collapsed = words.join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut in_quote = false;
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if !in_quote && c == ' ' {
            let next_is_punct = matches!(chars.peek(), Some('(' | ')' | ','));
            let prev_is_punct = matches!(out.chars().last(), Some('(' | ')' | ','));
            if next_is_punct || prev_is_punct {
                continue;
            }
        }
        out.push(c);
    }
    out
}
