//! CSV spool files feeding `COPY ... FROM STDIN`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::warn;

use super::{clean_value, csv_line};
use crate::core::{ExportRow, ExportStats, RowSink};
use crate::error::Result;

/// Writes cleaned rows to a uniquely named CSV file.
///
/// The file lives until the [`SpoolFile`] returned by [`CsvSpool::finish`]
/// (or the spool itself) is dropped.
pub struct CsvSpool {
    table: String,
    expected: usize,
    sentinel: String,
    skip: Option<usize>,
    /// Per source column: repair malformed JSON.
    json: Vec<bool>,
    file: NamedTempFile,
    writer: BufWriter<File>,
    stats: ExportStats,
}

impl CsvSpool {
    pub fn create(
        table: &str,
        expected: usize,
        sentinel: &str,
        spool_dir: Option<&Path>,
    ) -> Result<Self> {
        let prefix = format!("{}_", file_safe(table));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".csv");
        let file = match spool_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let writer = BufWriter::new(file.as_file().try_clone()?);
        Ok(Self {
            table: table.to_string(),
            expected,
            sentinel: sentinel.to_string(),
            skip: None,
            json: Vec::new(),
            file,
            writer,
            stats: ExportStats::default(),
        })
    }

    /// Leave column `index` out of the written lines. Width is still checked
    /// against the full row.
    pub fn skip_column(mut self, index: Option<usize>) -> Self {
        self.skip = index;
        self
    }

    /// Mark which columns (by index in the full row) load into JSON
    /// columns. Only those get JSON repair; missing entries count as false.
    pub fn json_columns(mut self, mask: Vec<bool>) -> Self {
        self.json = mask;
        self
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stats(&self) -> ExportStats {
        self.stats
    }

    /// Flush buffered rows and hand over the file.
    pub fn finish(mut self) -> Result<SpoolFile> {
        self.writer.flush()?;
        Ok(SpoolFile {
            file: self.file,
            stats: self.stats,
        })
    }
}

impl RowSink for CsvSpool {
    fn write_row(&mut self, row: ExportRow) -> Result<bool> {
        if row.len() != self.expected {
            warn!(
                "{}: dropping row with {} fields, expected {}",
                self.table,
                row.len(),
                self.expected
            );
            self.stats.dropped += 1;
            return Ok(false);
        }
        let cleaned: Vec<Option<String>> = row
            .values
            .into_iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.skip)
            .map(|(i, v)| {
                let json = self.json.get(i).copied().unwrap_or(false);
                v.map(|s| clean_value(&s, json))
            })
            .collect();
        writeln!(self.writer, "{}", csv_line(&cleaned, &self.sentinel))?;
        self.stats.rows += 1;
        Ok(true)
    }
}

/// A completed spool file. Deleted when dropped.
pub struct SpoolFile {
    file: NamedTempFile,
    pub stats: ExportStats,
}

impl SpoolFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}

fn file_safe(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[Option<&str>]) -> ExportRow {
        ExportRow::new(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_spool_writes_csv_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = CsvSpool::create("Clients", 3, "\\N", Some(dir.path())).unwrap();
        assert!(spool
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("Clients_"));

        assert!(spool.write_row(row(&[Some("5"), Some("O'Brien"), None])).unwrap());
        assert!(spool.write_row(row(&[Some("6"), Some(""), Some("a,b")])).unwrap());
        let done = spool.finish().unwrap();

        let text = std::fs::read_to_string(done.path()).unwrap();
        assert_eq!(text, "5,O'Brien,\\N\n6,\"\",\"a,b\"\n");
        assert_eq!(done.stats.rows, 2);
        assert_eq!(done.stats.dropped, 0);
    }

    #[test]
    fn test_spool_drops_wrong_width() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = CsvSpool::create("t", 2, "\\N", Some(dir.path())).unwrap();
        assert!(!spool.write_row(row(&[Some("1")])).unwrap());
        assert!(spool.write_row(row(&[Some("1"), Some("x")])).unwrap());
        assert!(!spool.write_row(row(&[Some("1"), Some("x"), Some("y")])).unwrap());
        let done = spool.finish().unwrap();
        assert_eq!(done.stats.rows, 1);
        assert_eq!(done.stats.dropped, 2);
    }

    #[test]
    fn test_spool_skips_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = CsvSpool::create("t", 3, "\\N", Some(dir.path()))
            .unwrap()
            .skip_column(Some(0));
        spool
            .write_row(row(&[Some("7"), Some("a"), None]))
            .unwrap();
        let done = spool.finish().unwrap();
        let text = std::fs::read_to_string(done.path()).unwrap();
        assert_eq!(text, "a,\\N\n");
    }

    #[test]
    fn test_spool_cleans_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = CsvSpool::create("t", 2, "\\N", Some(dir.path()))
            .unwrap()
            .json_columns(vec![false, true]);
        spool
            .write_row(row(&[Some("a\u{0}b"), Some("{k: v}")]))
            .unwrap();
        let done = spool.finish().unwrap();
        let text = std::fs::read_to_string(done.path()).unwrap();
        assert_eq!(text, "ab,\"{\"\"k\"\": \"\"v\"\"}\"\n");
    }

    #[test]
    fn test_spool_repairs_json_only_in_json_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = CsvSpool::create("t", 3, "\\N", Some(dir.path()))
            .unwrap()
            .skip_column(Some(0))
            .json_columns(vec![false, false, true]);
        spool
            .write_row(row(&[Some("1"), Some("[1, two]"), Some("[1, two]")]))
            .unwrap();
        spool
            .write_row(row(&[Some("2"), Some("{TODO: call back}"), None]))
            .unwrap();
        let done = spool.finish().unwrap();
        let text = std::fs::read_to_string(done.path()).unwrap();
        assert_eq!(
            text,
            "\"[1, two]\",\"[1, \"\"two\"\"]\"\n{TODO: call back},\\N\n"
        );
    }

    #[test]
    fn test_spool_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let spool = CsvSpool::create("weird/name", 1, "\\N", Some(dir.path())).unwrap();
        let done = spool.finish().unwrap();
        let path = done.to_path_buf();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("weird_name_"));
        assert!(path.exists());
        drop(done);
        assert!(!path.exists());
    }
}
