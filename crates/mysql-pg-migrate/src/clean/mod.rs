//! Row cleaning and CSV spooling for the PostgreSQL COPY import.
//!
//! Values arrive either from the native MySQL driver (real NULLs already
//! `None`) or from a raw tab-separated export, where NULL is spelled as a
//! token and rows may have been split across physical lines.

mod assemble;
mod json;
mod spool;

pub use assemble::{AssembledRows, LineOutcome, RowAssembler};
pub use json::fix_json;
pub use spool::{CsvSpool, SpoolFile};

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[\u{0}-\u{8}\u{b}\u{c}\u{e}-\u{1f}\u{7f}-\u{9f}]").expect("valid regex")
});

/// Map NULL-ish tokens from a text export to `None`.
///
/// Only used on the TSV path; driver rows keep `"NULL"` as a real string.
pub fn canonical_null(token: &str) -> Option<String> {
    match token.trim() {
        "NULL" | "null" | "\\N" | "" => None,
        _ => Some(token.to_string()),
    }
}

/// Strip control characters. With `json` set, also repair a value that
/// looks like a JSON object or array but does not parse.
pub fn clean_value(value: &str, json: bool) -> String {
    let stripped = CONTROL_CHARS.replace_all(value, "");
    if json {
        let trimmed = stripped.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<serde_json::Value>(&stripped).is_err()
        {
            if let Some(fixed) = fix_json(&stripped) {
                return fixed;
            }
        }
    }
    stripped.into_owned()
}

/// Whether a PostgreSQL column type holds JSON (`JSON` or `JSONB`).
pub fn is_json_type(target_type: &str) -> bool {
    target_type.trim().to_ascii_uppercase().starts_with("JSON")
}

/// Render one CSV field. `None` becomes the bare sentinel; a value that could
/// be confused with it, with an empty field or with COPY's `\.` end-of-data
/// line is quoted.
pub fn csv_escape<'a>(value: Option<&'a str>, sentinel: &'a str) -> Cow<'a, str> {
    let Some(v) = value else {
        return Cow::Borrowed(sentinel);
    };
    let needs_quotes = v.is_empty()
        || v == sentinel
        || v == "\\."
        || v.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", v.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(v)
    }
}

/// Join escaped fields into a CSV line without the trailing newline.
pub fn csv_line(values: &[Option<String>], sentinel: &str) -> String {
    values
        .iter()
        .map(|v| csv_escape(v.as_deref(), sentinel))
        .collect::<Vec<_>>()
        .join(",")
}
