//! PostgreSQL statement rendering.
//!
//! Phase 1 gets a `CREATE TABLE` with column definitions only; the primary
//! key, indexes and foreign keys are separate statements issued later.

use tracing::warn;

use crate::core::identifier::{
    qualify_pg, quote_literal, quote_pg, quote_pg_list, truncate_pg_identifier,
};
use crate::core::{CaseMode, ColumnDefault, ColumnSpec, ForeignKeySpec, IndexSpec, TableSpec};
use crate::error::Result;

use super::typemap::TypeMapper;

/// Options shared by the renderers.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub case_mode: CaseMode,
    /// Schema to qualify table names with; unqualified when `None`.
    pub schema: Option<String>,
}

impl ConvertOptions {
    pub fn new(case_mode: CaseMode, schema: Option<String>) -> Self {
        Self { case_mode, schema }
    }

    fn table_ref(&self, table: &str) -> Result<String> {
        match &self.schema {
            Some(schema) => qualify_pg(schema, table),
            None => quote_pg(table),
        }
    }
}

/// Render the phase-1 `CREATE TABLE` statement.
pub fn render_create_table(
    spec: &TableSpec,
    mapper: &TypeMapper,
    opts: &ConvertOptions,
) -> Result<String> {
    let spec = spec.with_case(opts.case_mode);
    let mut lines = Vec::with_capacity(spec.columns.len());
    for col in &spec.columns {
        lines.push(format!("  {}", render_column(&spec.name, col, mapper)?));
    }
    Ok(format!(
        "CREATE TABLE {} (\n{}\n);",
        opts.table_ref(&spec.name)?,
        lines.join(",\n")
    ))
}

fn render_column(table: &str, col: &ColumnSpec, mapper: &TypeMapper) -> Result<String> {
    let mapping = mapper.map_column(col);
    if let Some(warning) = &mapping.warning {
        warn!("{}.{}: {}", table, col.name, warning);
    }

    let mut def = format!("{} {}", quote_pg(&col.name)?, mapping.target_type);
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if !col.auto_increment {
        if let Some(default) = &col.default {
            let rendered = render_default(default, &mapping.target_type);
            def.push_str(" DEFAULT ");
            def.push_str(&rendered);
        }
    }
    Ok(def)
}

/// Translate a MySQL default into PostgreSQL syntax for `target_type`.
pub fn render_default(default: &ColumnDefault, target_type: &str) -> String {
    let is_boolean = target_type.eq_ignore_ascii_case("BOOLEAN");
    match default {
        ColumnDefault::Null => "NULL".to_string(),
        ColumnDefault::Literal(value) => {
            if is_zero_date(value) {
                return "NULL".to_string();
            }
            if is_boolean {
                if let Some(b) = boolean_literal(value) {
                    return b.to_string();
                }
            }
            quote_literal(value)
        }
        ColumnDefault::Expression(expr) => {
            if is_current_timestamp(expr) {
                return "CURRENT_TIMESTAMP".to_string();
            }
            let upper = expr.to_ascii_uppercase();
            if upper == "CURDATE()" || upper == "CURRENT_DATE()" || upper == "CURRENT_DATE" {
                return "CURRENT_DATE".to_string();
            }
            if is_boolean {
                if let Some(b) = boolean_literal(expr) {
                    return b.to_string();
                }
            }
            expr.clone()
        }
    }
}

fn is_zero_date(value: &str) -> bool {
    value.starts_with("0000-00-00")
}

fn boolean_literal(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "b'0'" => Some(false),
        "1" | "true" | "b'1'" => Some(true),
        _ => None,
    }
}

fn is_current_timestamp(expr: &str) -> bool {
    let upper = expr.trim().to_ascii_uppercase();
    let base = match upper.find('(') {
        Some(open) if upper.ends_with(')') => {
            let args = &upper[open + 1..upper.len() - 1];
            if !args.chars().all(|c| c.is_ascii_digit()) {
                return false;
            }
            &upper[..open]
        }
        Some(_) => return false,
        None => upper.as_str(),
    };
    matches!(
        base,
        "CURRENT_TIMESTAMP" | "NOW" | "LOCALTIMESTAMP" | "LOCALTIME"
    )
}

/// Target index name: `<table_lower>_<index>`, cut to PostgreSQL's limit.
pub fn target_index_name(table: &str, index: &str) -> String {
    let full = format!("{}_{}", table.to_lowercase(), index);
    truncate_pg_identifier(&full).to_string()
}

/// Primary key constraint name: `<table>_pkey`.
pub fn primary_key_name(table: &str) -> String {
    truncate_pg_identifier(&format!("{}_pkey", table)).to_string()
}

/// Sequence backing an auto-increment column: `<table>_<column>_seq`.
pub fn sequence_name(table: &str, column: &str) -> String {
    truncate_pg_identifier(&format!("{}_{}_seq", table, column)).to_string()
}

/// `CREATE [UNIQUE] INDEX "name" ON "schema"."table" (cols)`.
pub fn create_index_sql(
    schema: &str,
    table: &str,
    index_name: &str,
    index: &IndexSpec,
) -> Result<String> {
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_pg(index_name)?,
        qualify_pg(schema, table)?,
        quote_pg_list(&index.columns)?
    ))
}

/// `ALTER TABLE ... ADD CONSTRAINT "<table>_pkey" PRIMARY KEY (cols)`.
pub fn add_primary_key_sql(schema: &str, table: &str, columns: &[String]) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
        qualify_pg(schema, table)?,
        quote_pg(&primary_key_name(table))?,
        quote_pg_list(columns)?
    ))
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY ... REFERENCES ...`.
pub fn add_foreign_key_sql(schema: &str, table: &str, fk: &ForeignKeySpec) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        qualify_pg(schema, table)?,
        quote_pg(fk.name.as_str())?,
        quote_pg_list(&fk.columns)?,
        qualify_pg(schema, &fk.ref_table)?,
        quote_pg_list(&fk.ref_columns)?,
        fk.on_delete.as_sql(),
        fk.on_update.as_sql()
    ))
}

/// Phase 2 and 3 statements for a table: primary key, indexes, foreign keys.
pub fn render_constraints(spec: &TableSpec, opts: &ConvertOptions) -> Result<Vec<String>> {
    let spec = spec.with_case(opts.case_mode);
    let schema = opts.schema.as_deref().unwrap_or("public");
    let mut statements = Vec::new();
    if !spec.primary_key.is_empty() {
        statements.push(add_primary_key_sql(schema, &spec.name, &spec.primary_key)?);
    }
    for index in &spec.indexes {
        let name = target_index_name(&spec.name, &index.name);
        statements.push(create_index_sql(schema, &spec.name, &name, index)?);
    }
    for fk in &spec.foreign_keys {
        statements.push(add_foreign_key_sql(schema, &spec.name, fk)?);
    }
    Ok(statements)
}
