//! Reassembly of tab-separated rows split across physical lines.
//!
//! Text exports of tables with embedded newlines break one logical row into
//! several lines. Lines are joined (with a single space) until the field
//! count reaches the expected column count.

use tracing::warn;

use super::canonical_null;
use crate::core::ExportRow;

/// Result of feeding one physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A complete row.
    Row(ExportRow),
    /// The pending row was dropped.
    Dropped,
    /// More lines are needed (or the line was skipped).
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledRows {
    pub rows: Vec<ExportRow>,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct RowAssembler {
    expected: usize,
    max_lines_per_row: usize,
    skip_header: bool,
    buffer: String,
    buffered_lines: usize,
    start_line: usize,
    line_no: usize,
}

impl RowAssembler {
    pub fn new(expected: usize, max_lines_per_row: usize) -> Self {
        Self {
            expected,
            max_lines_per_row: max_lines_per_row.max(1),
            skip_header: false,
            buffer: String::new(),
            buffered_lines: 0,
            start_line: 0,
            line_no: 0,
        }
    }

    /// Treat the first non-blank line as a column header.
    pub fn with_header(mut self, skip_header: bool) -> Self {
        self.skip_header = skip_header;
        self
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Assemble a whole text export.
    pub fn assemble(mut self, text: &str) -> AssembledRows {
        let mut out = AssembledRows::default();
        for line in text.lines() {
            match self.push_line(line) {
                LineOutcome::Row(row) => out.rows.push(row),
                LineOutcome::Dropped => out.dropped += 1,
                LineOutcome::Pending => {}
            }
        }
        if self.finish() {
            out.dropped += 1;
        }
        out
    }

    /// Feed one physical line (without its terminator).
    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        self.line_no += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if self.buffered_lines == 0 {
            if line.trim().is_empty() {
                return LineOutcome::Pending;
            }
            if self.skip_header {
                self.skip_header = false;
                return LineOutcome::Pending;
            }
            self.buffer.push_str(line);
            self.start_line = self.line_no;
        } else {
            self.buffer.push(' ');
            self.buffer.push_str(line);
        }
        self.buffered_lines += 1;

        let fields = self.buffer.split('\t').count();
        if fields == self.expected {
            let values = self.buffer.split('\t').map(canonical_null).collect();
            self.reset();
            return LineOutcome::Row(ExportRow::new(values));
        }
        if fields > self.expected {
            warn!(
                "Dropping row starting at line {}: {} fields, expected {}",
                self.start_line, fields, self.expected
            );
            self.reset();
            return LineOutcome::Dropped;
        }
        if self.buffered_lines >= self.max_lines_per_row {
            warn!(
                "Dropping row starting at line {}: still {} of {} fields after {} lines",
                self.start_line, fields, self.expected, self.buffered_lines
            );
            self.reset();
            return LineOutcome::Dropped;
        }
        LineOutcome::Pending
    }

    /// Signal end of input. Returns true if an incomplete row was dropped.
    pub fn finish(&mut self) -> bool {
        if self.buffered_lines == 0 {
            return false;
        }
        warn!(
            "Dropping incomplete row starting at line {} at end of input",
            self.start_line
        );
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.buffered_lines = 0;
    }
}
