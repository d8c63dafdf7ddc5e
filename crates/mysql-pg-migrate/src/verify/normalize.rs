//! Type normalization for structure comparison.
//!
//! Both sides are reduced to PostgreSQL `information_schema.columns.data_type`
//! spelling with arguments dropped, so `VARCHAR(50)` on the expected side and
//! `character varying` read back from the target compare equal.
//!
//! Serial columns have no type of their own in PostgreSQL. An auto-increment
//! integer on the source and an integer whose default is `nextval(...)` on the
//! target both normalize to `serial`, `bigserial` or `smallserial`.

use crate::core::{ColumnFacts, ColumnSpec};
use crate::ddl::TypeMapper;

/// Canonical spelling of a PostgreSQL type name.
pub fn canonical_type(pg_type: &str) -> String {
    let lower = pg_type.trim().to_lowercase();

    // drop every parenthesized argument list
    let mut stripped = String::with_capacity(lower.len());
    let mut depth = 0usize;
    for c in lower.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    let canonical = match collapsed.as_str() {
        "varchar" => "character varying",
        "char" | "bpchar" => "character",
        "timestamp" => "timestamp without time zone",
        "timestamptz" => "timestamp with time zone",
        "time" => "time without time zone",
        "timetz" => "time with time zone",
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "float8" | "double" => "double precision",
        "float4" => "real",
        "decimal" => "numeric",
        "varbit" => "bit varying",
        other => other,
    };
    canonical.to_string()
}

/// Serial pseudo-type for an integer type, if it has one.
pub fn serial_for(canonical: &str) -> Option<&'static str> {
    match canonical {
        "integer" | "serial" => Some("serial"),
        "bigint" | "bigserial" => Some("bigserial"),
        "smallint" | "smallserial" => Some("smallserial"),
        _ => None,
    }
}

/// Type the target column should have, from the source column.
pub fn expected_type(col: &ColumnSpec, mapper: &TypeMapper) -> String {
    let canonical = canonical_type(&mapper.map_column(col).target_type);
    if col.auto_increment {
        if let Some(serial) = serial_for(&canonical) {
            return serial.to_string();
        }
    }
    canonical
}

/// Type of a column read back from the target.
pub fn actual_type(facts: &ColumnFacts) -> String {
    let canonical = canonical_type(&facts.data_type);
    let sequence_backed = facts
        .default
        .as_deref()
        .map(|d| d.trim_start().to_lowercase().starts_with("nextval("))
        .unwrap_or(false);
    if sequence_backed {
        if let Some(serial) = serial_for(&canonical) {
            return serial.to_string();
        }
    }
    canonical
}
