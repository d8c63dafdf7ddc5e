//! Id preservation check.
//!
//! Both sides are read in ascending keyset pages and merged, so the walk
//! holds at most one page per side no matter how large the table is.

use std::collections::VecDeque;

use serde::Serialize;

use crate::core::{IdStats, SourceSchema, TargetSchema};
use crate::error::Result;

/// Ids fetched per page and side.
pub const ID_PAGE_SIZE: usize = 10_000;

/// Ids kept per direction for the report.
pub const ID_SAMPLE_LIMIT: usize = 10;

/// Comparison of one id column between source and target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdCheck {
    pub column: String,
    pub source: IdStats,
    pub target: IdStats,
    pub missing_in_target: u64,
    pub extra_in_target: u64,
    /// Smallest ids present in the source only.
    pub missing_sample: Vec<i64>,
    /// Smallest ids present in the target only.
    pub extra_sample: Vec<i64>,
}

impl IdCheck {
    pub fn is_ok(&self) -> bool {
        self.source == self.target && self.missing_in_target == 0 && self.extra_in_target == 0
    }

    fn record_missing(&mut self, id: i64) {
        self.missing_in_target += 1;
        if self.missing_sample.len() < ID_SAMPLE_LIMIT {
            self.missing_sample.push(id);
        }
    }

    fn record_extra(&mut self, id: i64) {
        self.extra_in_target += 1;
        if self.extra_sample.len() < ID_SAMPLE_LIMIT {
            self.extra_sample.push(id);
        }
    }
}

#[derive(Debug, Default)]
struct IdCursor {
    buffered: VecDeque<i64>,
    after: Option<i64>,
    exhausted: bool,
}

impl IdCursor {
    fn needs_page(&self) -> bool {
        self.buffered.is_empty() && !self.exhausted
    }

    fn load(&mut self, page: Vec<i64>, page_size: usize) {
        self.exhausted = page.len() < page_size;
        if let Some(last) = page.last() {
            self.after = Some(*last);
        }
        self.buffered.extend(page);
    }

    fn peek(&self) -> Option<i64> {
        self.buffered.front().copied()
    }

    fn advance(&mut self) {
        self.buffered.pop_front();
    }
}

/// Walk `source_table.source_column` and `target_table.target_column` in
/// id order and count ids present on one side only.
pub async fn compare_ids(
    source: &dyn SourceSchema,
    target: &dyn TargetSchema,
    source_ref: (&str, &str),
    target_ref: (&str, &str),
    page_size: usize,
) -> Result<IdCheck> {
    let (source_table, source_column) = source_ref;
    let (target_table, target_column) = target_ref;
    let page_size = page_size.max(1);

    let mut check = IdCheck {
        column: target_column.to_string(),
        source: source.id_stats(source_table, source_column).await?,
        target: target.id_stats(target_table, target_column).await?,
        ..IdCheck::default()
    };

    let mut src = IdCursor::default();
    let mut dst = IdCursor::default();
    loop {
        if src.needs_page() {
            let page = source
                .id_page(source_table, source_column, src.after, page_size)
                .await?;
            src.load(page, page_size);
        }
        if dst.needs_page() {
            let page = target
                .id_page(target_table, target_column, dst.after, page_size)
                .await?;
            dst.load(page, page_size);
        }
        match (src.peek(), dst.peek()) {
            (None, None) => break,
            (Some(a), Some(b)) if a == b => {
                src.advance();
                dst.advance();
            }
            (Some(a), Some(b)) if a < b => {
                check.record_missing(a);
                src.advance();
            }
            (Some(a), None) => {
                check.record_missing(a);
                src.advance();
            }
            (_, Some(b)) => {
                check.record_extra(b);
                dst.advance();
            }
        }
    }
    Ok(check)
}
