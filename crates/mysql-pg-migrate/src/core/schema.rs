//! Table, column and constraint metadata shared by every pipeline stage.
//!
//! A [`TableSpec`] is rebuilt on each invocation, either from the live
//! `information_schema` of the source or by parsing `CREATE TABLE` text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier case policy for target objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Keep the MySQL spelling; identifiers are always double-quoted.
    #[default]
    Preserve,
    /// Fold every identifier to lowercase.
    Lower,
}

impl CaseMode {
    pub fn apply(&self, ident: &str) -> String {
        match self {
            CaseMode::Preserve => ident.to_string(),
            CaseMode::Lower => ident.to_lowercase(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" => Some(CaseMode::Preserve),
            "lower" | "lowercase" => Some(CaseMode::Lower),
            _ => None,
        }
    }
}

/// The three per-table migration phases, run in numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MigrationPhase {
    TableAndData = 1,
    Indexes = 2,
    ForeignKeys = 3,
}

impl MigrationPhase {
    pub const ALL: [MigrationPhase; 3] = [
        MigrationPhase::TableAndData,
        MigrationPhase::Indexes,
        MigrationPhase::ForeignKeys,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(MigrationPhase::TableAndData),
            2 => Some(MigrationPhase::Indexes),
            3 => Some(MigrationPhase::ForeignKeys),
            _ => None,
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MigrationPhase::TableAndData => "table and data",
            MigrationPhase::Indexes => "indexes",
            MigrationPhase::ForeignKeys => "foreign keys",
        };
        write!(f, "phase {} ({})", self.number(), label)
    }
}

/// ON DELETE / ON UPDATE behavior of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    #[default]
    Restrict,
    NoAction,
}

impl ReferentialAction {
    /// Parse a rule as written by MySQL. Unknown values become `Restrict`.
    pub fn parse(s: &str) -> Self {
        let normalized = s
            .trim()
            .to_ascii_uppercase()
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "CASCADE" => ReferentialAction::Cascade,
            "SET NULL" => ReferentialAction::SetNull,
            "NO ACTION" => ReferentialAction::NoAction,
            _ => ReferentialAction::Restrict,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

/// A column default as declared in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDefault {
    Null,
    /// A quoted string in the source, stored unescaped.
    Literal(String),
    /// Numbers, keywords and function calls, stored verbatim.
    Expression(String),
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Full MySQL column type, e.g. `int(11) unsigned`.
    pub source_type: String,

    /// Whether the column allows NULL.
    pub nullable: bool,

    /// Declared default, if any.
    pub default: Option<ColumnDefault>,

    /// Whether the column is AUTO_INCREMENT.
    pub auto_increment: bool,

    /// Explicit target type that bypasses the type rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            nullable: true,
            default: None,
            auto_increment: false,
            target_type: None,
        }
    }

    /// Whether the source type is one of the MySQL integer types.
    pub fn is_integer(&self) -> bool {
        is_integer_type(&self.source_type)
    }
}

/// Whether a MySQL type string names an integer type (any display width).
pub fn is_integer_type(source_type: &str) -> bool {
    let lower = source_type.trim().to_ascii_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("");
    if base == "tinyint" && lower.starts_with("tinyint(1)") {
        // tinyint(1) is a boolean
        return false;
    }
    matches!(
        base,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint"
    )
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique per table in MySQL.
    pub name: String,

    /// Indexed column names in key order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub unique: bool,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Constraint name.
    pub name: String,

    /// Referencing column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,

    pub on_delete: ReferentialAction,

    pub on_update: ReferentialAction,
}

/// Table metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnSpec>,

    /// Primary key column names.
    pub primary_key: Vec<String>,

    /// Secondary indexes (primary key excluded).
    pub indexes: Vec<IndexSpec>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKeySpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Find a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnSpec> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The single integer AUTO_INCREMENT column, if there is one.
    pub fn auto_increment_column(&self) -> Option<&ColumnSpec> {
        let mut candidates = self
            .columns
            .iter()
            .filter(|c| c.auto_increment && c.is_integer());
        match (candidates.next(), candidates.next()) {
            (Some(col), None) => Some(col),
            _ => None,
        }
    }

    /// Distinct tables referenced by foreign keys, self-references included.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for fk in &self.foreign_keys {
            if !tables.iter().any(|t| t == &fk.ref_table) {
                tables.push(fk.ref_table.clone());
            }
        }
        tables
    }

    /// Copy with every identifier mapped through the case policy.
    pub fn with_case(&self, mode: CaseMode) -> TableSpec {
        if mode == CaseMode::Preserve {
            return self.clone();
        }
        let map_all = |names: &[String]| names.iter().map(|n| mode.apply(n)).collect::<Vec<_>>();
        TableSpec {
            name: mode.apply(&self.name),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnSpec {
                    name: mode.apply(&c.name),
                    ..c.clone()
                })
                .collect(),
            primary_key: map_all(&self.primary_key),
            indexes: self
                .indexes
                .iter()
                .map(|i| IndexSpec {
                    name: mode.apply(&i.name),
                    columns: map_all(&i.columns),
                    unique: i.unique,
                })
                .collect(),
            foreign_keys: self
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeySpec {
                    name: mode.apply(&fk.name),
                    columns: map_all(&fk.columns),
                    ref_table: mode.apply(&fk.ref_table),
                    ref_columns: map_all(&fk.ref_columns),
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                })
                .collect(),
        }
    }
}

/// One row on its way from the source to the spool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    /// Field values; `None` is NULL and never equal to `Some("")`.
    pub values: Vec<Option<String>>,
}

impl ExportRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column facts read back from a live database, used by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFacts {
    pub name: String,

    /// MySQL `COLUMN_TYPE` or PostgreSQL `data_type`.
    pub data_type: String,

    pub nullable: bool,

    /// Raw default expression as reported by the database.
    pub default: Option<String>,

    /// MySQL AUTO_INCREMENT (always false on the target side).
    pub auto_increment: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableSpec {
        let mut id = ColumnSpec::new("Id", "int(11) unsigned");
        id.nullable = false;
        id.auto_increment = true;
        TableSpec {
            name: "ClientSMS".to_string(),
            columns: vec![id, ColumnSpec::new("ClientId", "int(11)")],
            primary_key: vec!["Id".to_string()],
            indexes: vec![IndexSpec {
                name: "IX_Client".to_string(),
                columns: vec!["ClientId".to_string()],
                unique: false,
            }],
            foreign_keys: vec![ForeignKeySpec {
                name: "FK_ClientSMS_Client".to_string(),
                columns: vec!["ClientId".to_string()],
                ref_table: "Client".to_string(),
                ref_columns: vec!["Id".to_string()],
                on_delete: ReferentialAction::Cascade,
                on_update: ReferentialAction::Restrict,
            }],
        }
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse("set null"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("SET_NULL"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("No  Action"), ReferentialAction::NoAction);
        assert_eq!(ReferentialAction::parse("restrict"), ReferentialAction::Restrict);
        assert_eq!(ReferentialAction::parse("SET DEFAULT"), ReferentialAction::Restrict);
        assert_eq!(ReferentialAction::parse(""), ReferentialAction::Restrict);
    }

    #[test]
    fn test_phase_numbers() {
        assert_eq!(MigrationPhase::from_number(2), Some(MigrationPhase::Indexes));
        assert_eq!(MigrationPhase::from_number(4), None);
        assert_eq!(MigrationPhase::ForeignKeys.number(), 3);
        assert!(MigrationPhase::TableAndData < MigrationPhase::ForeignKeys);
        assert_eq!(
            MigrationPhase::Indexes.to_string(),
            "phase 2 (indexes)"
        );
    }

    #[test]
    fn test_is_integer_type() {
        assert!(is_integer_type("int(11) unsigned"));
        assert!(is_integer_type("BIGINT(20)"));
        assert!(is_integer_type("tinyint(4)"));
        assert!(!is_integer_type("tinyint(1)"));
        assert!(!is_integer_type("decimal(10,2)"));
        assert!(!is_integer_type("interval"));
    }

    #[test]
    fn test_auto_increment_column() {
        let table = sample_table();
        assert_eq!(table.auto_increment_column().map(|c| c.name.as_str()), Some("Id"));

        let mut no_ai = table.clone();
        no_ai.columns[0].auto_increment = false;
        assert!(no_ai.auto_increment_column().is_none());
    }

    #[test]
    fn test_with_case_lower() {
        let lowered = sample_table().with_case(CaseMode::Lower);
        assert_eq!(lowered.name, "clientsms");
        assert_eq!(lowered.column_names(), vec!["id", "clientid"]);
        assert_eq!(lowered.primary_key, vec!["id"]);
        assert_eq!(lowered.indexes[0].columns, vec!["clientid"]);
        assert_eq!(lowered.foreign_keys[0].ref_table, "client");
        assert_eq!(lowered.foreign_keys[0].ref_columns, vec!["id"]);
        assert_eq!(lowered.columns[0].source_type, "int(11) unsigned");
    }

    #[test]
    fn test_default_table_is_empty() {
        let table = TableSpec::default();
        assert_eq!(table, TableSpec::new(""));
        assert!(table.columns.is_empty() && table.primary_key.is_empty());
    }

    #[test]
    fn test_with_case_preserve_is_identity() {
        let table = sample_table();
        assert_eq!(table.with_case(CaseMode::Preserve), table);
    }

    #[test]
    fn test_referenced_tables_dedup() {
        let mut table = sample_table();
        let mut fk = table.foreign_keys[0].clone();
        fk.name = "FK_other".to_string();
        table.foreign_keys.push(fk);
        assert_eq!(table.referenced_tables(), vec!["Client".to_string()]);
    }

    #[test]
    fn test_column_lookup_ignores_case() {
        let table = sample_table();
        assert!(table.column("clientid").is_some());
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_case_mode_serde() {
        let mode: CaseMode = serde_yaml::from_str("lower").unwrap();
        assert_eq!(mode, CaseMode::Lower);
        assert_eq!(CaseMode::parse("PRESERVE"), Some(CaseMode::Preserve));
    }
}
