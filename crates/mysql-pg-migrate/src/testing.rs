//! In-memory source and target used by pipeline, verifier and orchestrator
//! tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{
    ColumnFacts, ExportRow, ExportStats, ForeignKeySpec, IdStats, IndexSpec, RowSink,
    SourceSchema, TableSpec, TargetSchema,
};
use crate::ddl::{parse_create_table, primary_key_name, sequence_name};
use crate::error::{MigrateError, Result};

#[derive(Default)]
pub struct MemorySource {
    pub tables: BTreeMap<String, (TableSpec, Vec<ExportRow>)>,
    pub ddl: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn with_table(mut self, spec: TableSpec, rows: Vec<Vec<Option<&str>>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|r| ExportRow::new(r.into_iter().map(|v| v.map(str::to_string)).collect()))
            .collect();
        self.tables.insert(spec.name.clone(), (spec, rows));
        self
    }

    pub fn with_ddl(mut self, table: &str, ddl: &str) -> Self {
        self.ddl.insert(table.to_string(), ddl.to_string());
        self
    }

    fn ids(&self, table: &str, column: &str) -> Result<Vec<i64>> {
        let (spec, rows) = self.get(table)?;
        let idx = column_index(&spec.column_names(), table, column)?;
        Ok(sorted_ids(rows.iter().map(|r| r.values.as_slice()), idx))
    }

    fn get(&self, table: &str) -> Result<&(TableSpec, Vec<ExportRow>)> {
        self.tables
            .get(table)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no table {}", table)))
    }
}

#[async_trait]
impl SourceSchema for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSpec> {
        Ok(self.get(table)?.0.clone())
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        self.ddl
            .get(table)
            .cloned()
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no DDL for {}", table)))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.get(table)?.1.len() as i64)
    }

    async fn column_facts(&self, table: &str) -> Result<Vec<ColumnFacts>> {
        Ok(self
            .get(table)?
            .0
            .columns
            .iter()
            .map(|c| ColumnFacts {
                name: c.name.clone(),
                data_type: c.source_type.clone(),
                nullable: c.nullable,
                default: None,
                auto_increment: c.auto_increment,
            })
            .collect())
    }

    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats> {
        Ok(stats_of(&self.ids(table, column)?))
    }

    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>> {
        Ok(page_of(&self.ids(table, column)?, after, limit))
    }

    async fn export_rows(
        &self,
        spec: &TableSpec,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<ExportStats> {
        let mut stats = ExportStats::default();
        for row in &self.get(&spec.name)?.1 {
            if sink.write_row(row.clone())? {
                stats.rows += 1;
            } else {
                stats.dropped += 1;
            }
        }
        Ok(stats)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

#[derive(Debug, Default, Clone)]
pub struct MemTable {
    pub spec: TableSpec,
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default)]
pub struct TargetState {
    pub tables: BTreeMap<String, MemTable>,
    pub indexes: BTreeSet<String>,
    pub constraints: BTreeSet<(String, String)>,
    /// (table, column) -> next value
    pub sequences: BTreeMap<(String, String), i64>,
    pub executed: Vec<String>,
}

#[derive(Default)]
pub struct MemoryTarget {
    pub state: Mutex<TargetState>,
    /// Index names whose creation fails.
    pub failing_indexes: BTreeSet<String>,
}

impl MemoryTarget {
    pub fn rows(&self, table: &str) -> Vec<Vec<Option<String>>> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    fn ids(&self, table: &str, column: &str) -> Result<Vec<i64>> {
        let state = self.state.lock().unwrap();
        let mem = state
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))?;
        let idx = column_index(&mem.spec.column_names(), table, column)?;
        Ok(sorted_ids(mem.rows.iter().map(Vec::as_slice), idx))
    }

    pub fn has_constraint(&self, table: &str, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.constraints.contains(&(table.to_string(), name.to_string()))
    }
}

#[async_trait]
impl TargetSchema for MemoryTarget {
    fn schema(&self) -> &str {
        "public"
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.state.lock().unwrap().executed.push(sql.to_string());
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.tables.remove(table);
        state.constraints.retain(|(t, _)| t != table);
        state.sequences.retain(|(t, _), _| t != table);
        let prefix = format!("{}_", table.to_lowercase());
        state.indexes.retain(|i| !i.starts_with(&prefix));
        Ok(())
    }

    async fn create_table(&self, table: &str, ddl: &str) -> Result<()> {
        let spec = parse_create_table(ddl)?;
        let mut state = self.state.lock().unwrap();
        if state.tables.contains_key(table) {
            return Err(MigrateError::Validation(format!("{} already exists", table)));
        }
        state.executed.push(ddl.to_string());
        state.tables.insert(
            table.to_string(),
            MemTable {
                spec,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().tables.contains_key(table))
    }

    async fn index_exists(&self, index_name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().indexes.contains(index_name))
    }

    async fn create_index(&self, _table: &str, index_name: &str, _index: &IndexSpec) -> Result<()> {
        if self.failing_indexes.contains(index_name) {
            return Err(MigrateError::Validation(format!("cannot build {}", index_name)));
        }
        let mut state = self.state.lock().unwrap();
        if !state.indexes.insert(index_name.to_string()) {
            return Err(MigrateError::Validation(format!("{} already exists", index_name)));
        }
        Ok(())
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        Ok(self.has_constraint(table, constraint))
    }

    async fn add_primary_key(&self, table: &str, _columns: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = (table.to_string(), primary_key_name(table));
        if !state.constraints.insert(key) {
            return Err(MigrateError::Validation("primary key exists".into()));
        }
        Ok(())
    }

    async fn add_foreign_key(&self, table: &str, fk: &ForeignKeySpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.tables.contains_key(&fk.ref_table) {
            return Err(MigrateError::Validation(format!("{} missing", fk.ref_table)));
        }
        state
            .constraints
            .insert((table.to_string(), fk.name.clone()));
        Ok(())
    }

    async fn copy_csv(
        &self,
        table: &str,
        columns: &[String],
        path: &Path,
        null_sentinel: &str,
    ) -> Result<u64> {
        let text = std::fs::read_to_string(path)?;
        let parsed = parse_csv(&text, null_sentinel);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mem = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))?;
        let names = mem.spec.column_names();
        for record in &parsed {
            if record.len() != columns.len() {
                return Err(MigrateError::transfer(table, "column count mismatch"));
            }
            let mut full = vec![None; names.len()];
            for (value, col) in record.iter().zip(columns) {
                let idx = names
                    .iter()
                    .position(|n| n == col)
                    .ok_or_else(|| MigrateError::transfer(table, format!("no column {}", col)))?;
                full[idx] = value.clone();
            }
            mem.rows.push(full);
        }
        // columns left out of the COPY take their value from the sequence
        let omitted: Vec<(usize, String)> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| !columns.contains(n))
            .map(|(i, n)| (i, n.clone()))
            .collect();
        let start = mem.rows.len() - parsed.len();
        for (idx, name) in omitted {
            let key = (table.to_string(), name);
            if let Some(next) = state.sequences.get(&key).copied() {
                let mut value = next;
                for row in mem.rows[start..].iter_mut() {
                    row[idx] = Some(value.to_string());
                    value += 1;
                }
                state.sequences.insert(key, value);
            }
        }
        Ok(parsed.len() as u64)
    }

    async fn prepare_sequence(&self, table: &str, column: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state
            .sequences
            .entry((table.to_string(), column.to_string()))
            .or_insert(1);
        Ok(sequence_name(table, column))
    }

    async fn reseed_sequence(&self, table: &str, column: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        let mem = state
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))?;
        let idx = mem
            .spec
            .column_names()
            .iter()
            .position(|n| n == column)
            .ok_or_else(|| MigrateError::transfer(table, "no such column"))?;
        let max = mem
            .rows
            .iter()
            .filter_map(|r| r[idx].as_deref().and_then(|v| v.parse::<i64>().ok()))
            .max()
            .unwrap_or(0);
        state
            .sequences
            .insert((table.to_string(), column.to_string()), max + 1);
        Ok(max + 1)
    }

    async fn analyze(&self, table: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .executed
            .push(format!("ANALYZE {}", table));
        Ok(())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnFacts>> {
        let state = self.state.lock().unwrap();
        let Some(mem) = state.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(mem
            .spec
            .columns
            .iter()
            .map(|c| {
                let has_seq = state
                    .sequences
                    .contains_key(&(table.to_string(), c.name.clone()));
                ColumnFacts {
                    name: c.name.clone(),
                    data_type: c.source_type.clone(),
                    nullable: c.nullable,
                    default: has_seq.then(|| {
                        format!("nextval('{}'::regclass)", sequence_name(table, &c.name))
                    }),
                    auto_increment: false,
                }
            })
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        let mem = state
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))?;
        let idx = mem
            .spec
            .column_names()
            .iter()
            .position(|n| n == column)
            .ok_or_else(|| MigrateError::transfer(table, "no such column"))?;
        Ok(mem
            .rows
            .iter()
            .filter_map(|r| r[idx].as_deref().and_then(|v| v.parse::<i64>().ok()))
            .max())
    }

    async fn sequence_next_value(&self, table: &str, column: &str) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sequences
            .get(&(table.to_string(), column.to_string()))
            .copied())
    }

    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats> {
        Ok(stats_of(&self.ids(table, column)?))
    }

    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>> {
        Ok(page_of(&self.ids(table, column)?, after, limit))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

fn column_index(names: &[String], table: &str, column: &str) -> Result<usize> {
    names
        .iter()
        .position(|n| n == column)
        .ok_or_else(|| MigrateError::transfer(table, format!("no column {}", column)))
}

fn sorted_ids<'a>(rows: impl Iterator<Item = &'a [Option<String>]>, idx: usize) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .filter_map(|r| r[idx].as_deref().and_then(|v| v.parse::<i64>().ok()))
        .collect();
    ids.sort_unstable();
    ids
}

fn stats_of(ids: &[i64]) -> IdStats {
    IdStats {
        count: ids.len() as i64,
        min: ids.first().copied(),
        max: ids.last().copied(),
    }
}

fn page_of(ids: &[i64], after: Option<i64>, limit: usize) -> Vec<i64> {
    ids.iter()
        .copied()
        .filter(|id| after.map_or(true, |a| *id > a))
        .take(limit)
        .collect()
}

/// Minimal CSV reader matching what the spool writes. Like COPY, an
/// unquoted `\.` line ends the data.
pub fn parse_csv(text: &str, sentinel: &str) -> Vec<Vec<Option<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let finish_field = |field: &mut String, quoted: &mut bool, record: &mut Vec<Option<String>>| {
        let value = std::mem::take(field);
        if !*quoted && value == sentinel {
            record.push(None);
        } else {
            record.push(Some(value));
        }
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                quoted = true;
            }
            ',' => finish_field(&mut field, &mut quoted, &mut record),
            '\n' => {
                if record.is_empty() && !quoted && field == "\\." {
                    return records;
                }
                finish_field(&mut field, &mut quoted, &mut record);
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || quoted || !record.is_empty() {
        finish_field(&mut field, &mut quoted, &mut record);
        records.push(record);
    }
    records
}
