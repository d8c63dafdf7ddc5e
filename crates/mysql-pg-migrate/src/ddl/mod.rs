//! MySQL DDL → PostgreSQL DDL conversion.
//!
//! - [`parse`]: `SHOW CREATE TABLE` text into a [`TableSpec`]
//! - [`typemap`]: ordered regex rules for column types
//! - [`render`]: `CREATE TABLE`, index, primary key and foreign key statements

pub mod parse;
pub mod render;
pub mod typemap;

pub use parse::parse_create_table;
pub use render::{
    add_foreign_key_sql, add_primary_key_sql, create_index_sql, primary_key_name,
    render_constraints, render_create_table, render_default, sequence_name, target_index_name,
    ConvertOptions,
};
pub use typemap::{normalize_type, ColumnMapping, TypeMapper};

use tracing::warn;

use crate::config::TableOverride;
use crate::core::TableSpec;
use crate::error::Result;

/// Parse MySQL `CREATE TABLE` text and render the PostgreSQL equivalent.
///
/// Converting the output again yields the same text.
pub fn convert_create_table(text: &str, mapper: &TypeMapper, opts: &ConvertOptions) -> Result<String> {
    let spec = parse_create_table(text)?;
    render_create_table(&spec, mapper, opts)
}

/// Apply a per-table override: forced-nullable columns and explicit types.
pub fn apply_override(spec: &mut TableSpec, table_override: &TableOverride) {
    for name in &table_override.nullable_columns {
        match spec.column_mut(name) {
            Some(col) => col.nullable = true,
            None => warn!("{}: override names unknown column '{}'", spec.name, name),
        }
    }
    for (name, target_type) in &table_override.column_types {
        match spec.column_mut(name) {
            Some(col) => col.target_type = Some(target_type.clone()),
            None => warn!("{}: override names unknown column '{}'", spec.name, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaseMode;

    const CLIENT_SMS: &str = "CREATE TABLE `ClientSMS` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `message` text NOT NULL,
  `status` enum('queued','sent') NOT NULL DEFAULT 'queued',
  `active` tinyint(1) NOT NULL DEFAULT '1',
  `sentAt` datetime(3) DEFAULT NULL,
  `createdAt` datetime(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
  PRIMARY KEY (`id`),
  KEY `ClientSMS_status_idx` (`status`)
) ENGINE=InnoDB AUTO_INCREMENT=77 DEFAULT CHARSET=utf8mb4";

    fn opts() -> ConvertOptions {
        ConvertOptions::new(CaseMode::Preserve, Some("public".to_string()))
    }

    #[test]
    fn test_convert_boolean_default() {
        let sql = convert_create_table(
            "CREATE TABLE `t` (`active` tinyint(1) NOT NULL DEFAULT '1')",
            &TypeMapper::builtin(),
            &opts(),
        )
        .unwrap();
        assert!(sql.contains("\"active\" BOOLEAN NOT NULL DEFAULT true"));
    }

    #[test]
    fn test_convert_full_table() {
        let sql = convert_create_table(CLIENT_SMS, &TypeMapper::builtin(), &opts()).unwrap();
        assert!(sql.starts_with("CREATE TABLE \"public\".\"ClientSMS\" ("));
        assert!(sql.contains("\"id\" INTEGER NOT NULL,"));
        assert!(sql.contains("\"status\" TEXT NOT NULL DEFAULT 'queued'"));
        assert!(sql.contains("\"sentAt\" TIMESTAMP(3) DEFAULT NULL"));
        assert!(sql.contains("\"createdAt\" TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP"));
        assert!(!sql.contains("AUTO_INCREMENT"));
        assert!(!sql.contains("ENGINE"));
        assert!(!sql.contains("KEY"));
    }

    #[test]
    fn test_convert_is_idempotent() {
        let mapper = TypeMapper::builtin();
        for case_mode in [CaseMode::Preserve, CaseMode::Lower] {
            let o = ConvertOptions::new(case_mode, Some("public".to_string()));
            let once = convert_create_table(CLIENT_SMS, &mapper, &o).unwrap();
            let twice = convert_create_table(&once, &mapper, &o).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_convert_parse_failure_produces_nothing() {
        let err = convert_create_table("CREATE VIEW v AS SELECT 1", &TypeMapper::builtin(), &opts());
        assert!(matches!(err, Err(crate::error::MigrateError::Parse(_))));
    }

    #[test]
    fn test_apply_override() {
        let mut spec = parse_create_table(CLIENT_SMS).unwrap();
        let mut o = TableOverride::default();
        o.nullable_columns.push("message".to_string());
        o.column_types
            .insert("status".to_string(), "VARCHAR(100)".to_string());
        apply_override(&mut spec, &o);

        let sql = render_create_table(&spec, &TypeMapper::builtin(), &opts()).unwrap();
        assert!(sql.contains("\"message\" TEXT,"));
        assert!(sql.contains("\"status\" VARCHAR(100) NOT NULL DEFAULT 'queued'"));
    }
}
