//! `SHOW CREATE TABLE` text → [`TableSpec`].
//!
//! The parser works on the statement's structure rather than on
//! substitutions over the raw text: the column list is located by matching
//! parentheses, split on top-level commas, and each item is read with a
//! small cursor that understands quoted identifiers and string literals.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::core::{ColumnDefault, ColumnSpec, ForeignKeySpec, IndexSpec, ReferentialAction, TableSpec};
use crate::error::{MigrateError, Result};

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*CREATE\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?")
        .expect("valid regex")
});

/// Base type, optional arguments (quotes allowed), then sign/zerofill modifiers.
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^([a-z][a-z0-9_]*(?:\s+(?:precision|varying))?)\s*(\((?:[^()'"]|'(?:[^'\\]|\\.)*')*\))?((?:\s+(?:unsigned|signed|zerofill))*)"#,
    )
    .expect("valid regex")
});

static VERSION_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*!.*?\*/").expect("valid regex"));

/// Parse MySQL `CREATE TABLE` text.
///
/// Trailing table options are ignored. Fails with [`MigrateError::Parse`]
/// when no `CREATE TABLE name (...)` is found or the column list is empty.
pub fn parse_create_table(text: &str) -> Result<TableSpec> {
    let cleaned = VERSION_COMMENT_RE.replace_all(text, " ");

    let header = HEADER_RE
        .find(&cleaned)
        .ok_or_else(|| MigrateError::Parse("no CREATE TABLE statement found".into()))?;
    let after_header = &cleaned[header.end()..];

    let (name, rest) = take_qualified_ident(after_header)
        .ok_or_else(|| MigrateError::Parse("CREATE TABLE is missing a table name".into()))?;
    let (body, _options) = take_group(rest).ok_or_else(|| {
        MigrateError::Parse(format!("CREATE TABLE {}: unbalanced or missing column list", name))
    })?;

    let mut spec = TableSpec::new(name);
    let mut unnamed_fks = 0usize;

    for item in split_top_level(body) {
        parse_item(&mut spec, item, &mut unnamed_fks)?;
    }

    if spec.columns.is_empty() {
        return Err(MigrateError::Parse(format!(
            "CREATE TABLE {}: no columns found",
            spec.name
        )));
    }
    Ok(spec)
}

fn parse_item(spec: &mut TableSpec, item: &str, unnamed_fks: &mut usize) -> Result<()> {
    // CONSTRAINT [symbol] prefix, shared by PRIMARY KEY / UNIQUE / FOREIGN KEY / CHECK
    let (symbol, body) = match eat_keywords(item, &["CONSTRAINT"]) {
        Some(rest) => {
            if starts_with_any(rest, &["PRIMARY", "UNIQUE", "FOREIGN", "CHECK"]) {
                (None, rest)
            } else {
                let (sym, rest) = take_ident(rest).ok_or_else(|| {
                    MigrateError::Parse(format!("{}: malformed CONSTRAINT clause", spec.name))
                })?;
                (Some(sym), rest)
            }
        }
        None => (None, item),
    };

    if let Some(rest) = eat_keywords(body, &["PRIMARY", "KEY"]) {
        let (cols, _) = index_columns(rest)
            .ok_or_else(|| MigrateError::Parse(format!("{}: malformed PRIMARY KEY", spec.name)))?;
        spec.primary_key = cols;
        return Ok(());
    }

    if let Some(rest) = eat_keywords(body, &["FOREIGN", "KEY"]) {
        *unnamed_fks += 1;
        let fallback = format!("{}_ibfk_{}", spec.name, unnamed_fks);
        let fk = parse_foreign_key(rest, symbol.unwrap_or(fallback)).ok_or_else(|| {
            MigrateError::Parse(format!("{}: malformed FOREIGN KEY: {}", spec.name, item))
        })?;
        spec.foreign_keys.push(fk);
        return Ok(());
    }

    if let Some(rest) = eat_keywords(body, &["UNIQUE"]) {
        let rest = eat_keywords(rest, &["KEY"])
            .or_else(|| eat_keywords(rest, &["INDEX"]))
            .unwrap_or(rest);
        let index = parse_index(rest, true, symbol)
            .ok_or_else(|| MigrateError::Parse(format!("{}: malformed UNIQUE KEY", spec.name)))?;
        spec.indexes.push(index);
        return Ok(());
    }

    if let Some(rest) = eat_keywords(body, &["KEY"]).or_else(|| eat_keywords(body, &["INDEX"])) {
        match parse_index(rest, false, None) {
            Some(index) => spec.indexes.push(index),
            None => warn!("{}: skipping unsupported index definition: {}", spec.name, item),
        }
        return Ok(());
    }

    if starts_with_any(body, &["FULLTEXT", "SPATIAL"]) {
        warn!("{}: skipping {} (not migrated)", spec.name, first_word(body));
        return Ok(());
    }

    if eat_keywords(body, &["CHECK"]).is_some() {
        warn!("{}: skipping CHECK constraint (not migrated)", spec.name);
        return Ok(());
    }

    let column = parse_column(spec, item)?;
    spec.columns.push(column);
    Ok(())
}

fn parse_column(spec: &mut TableSpec, item: &str) -> Result<ColumnSpec> {
    let (name, rest) = take_ident(item)
        .ok_or_else(|| MigrateError::Parse(format!("{}: unreadable item: {}", spec.name, item)))?;

    let rest = rest.trim_start();
    let caps = TYPE_RE.captures(rest).ok_or_else(|| {
        MigrateError::Parse(format!("{}.{}: missing column type", spec.name, name))
    })?;
    let base = caps
        .get(1)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .to_lowercase();
    let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let modifiers = caps
        .get(3)
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .to_lowercase();
    let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);

    let mut source_type = format!("{}{}", base, args);
    if !modifiers.is_empty() {
        source_type.push(' ');
        source_type.push_str(&modifiers);
    }

    let mut column = ColumnSpec::new(name, source_type);
    let mut rest = &rest[consumed..];

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(r) = eat_keywords(rest, &["NOT", "NULL"]) {
            column.nullable = false;
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["NULL"]) {
            column.nullable = true;
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["DEFAULT"]) {
            let (token, r) = take_value(r).ok_or_else(|| {
                MigrateError::Parse(format!("{}.{}: DEFAULT without a value", spec.name, column.name))
            })?;
            column.default = Some(token.into_default());
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["AUTO_INCREMENT"]) {
            column.auto_increment = true;
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["ON", "UPDATE"]) {
            rest = skip_value(r);
        } else if let Some(r) = eat_keywords(rest, &["COMMENT"]) {
            rest = skip_value(r);
        } else if let Some(r) = eat_keywords(rest, &["CHARACTER", "SET"]) {
            rest = skip_value(r);
        } else if let Some(r) = eat_keywords(rest, &["CHARSET"])
            .or_else(|| eat_keywords(rest, &["COLLATE"]))
            .or_else(|| eat_keywords(rest, &["COLUMN_FORMAT"]))
            .or_else(|| eat_keywords(rest, &["STORAGE"]))
            .or_else(|| eat_keywords(rest, &["SRID"]))
        {
            rest = skip_value(r);
        } else if let Some(r) = eat_keywords(rest, &["PRIMARY", "KEY"]) {
            spec.primary_key = vec![column.name.clone()];
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["UNIQUE"]) {
            let r = eat_keywords(r, &["KEY"]).unwrap_or(r);
            spec.indexes.push(IndexSpec {
                name: column.name.clone(),
                columns: vec![column.name.clone()],
                unique: true,
            });
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["KEY"]) {
            spec.primary_key = vec![column.name.clone()];
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["GENERATED", "ALWAYS"]) {
            warn!(
                "{}.{}: generated column expression dropped; values are copied as data",
                spec.name, column.name
            );
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["AS"]) {
            rest = skip_value(r);
        } else {
            // VIRTUAL, STORED, VISIBLE, INVISIBLE and anything unrecognized
            rest = skip_value(rest);
        }
    }

    Ok(column)
}

fn parse_index(rest: &str, unique: bool, symbol: Option<String>) -> Option<IndexSpec> {
    let rest = rest.trim_start();
    let (name, rest) = if rest.starts_with('(') {
        (None, rest)
    } else {
        let (name, rest) = take_ident(rest)?;
        (Some(name), rest)
    };
    let rest = eat_using(rest);
    let (columns, _) = index_columns(rest)?;
    let name = name
        .or(symbol)
        .or_else(|| columns.first().cloned())?;
    Some(IndexSpec {
        name,
        columns,
        unique,
    })
}

fn parse_foreign_key(rest: &str, name: String) -> Option<ForeignKeySpec> {
    let mut rest = rest.trim_start();
    if !rest.starts_with('(') {
        // optional index name
        rest = take_ident(rest)?.1;
    }
    let (columns, rest) = index_columns(rest)?;
    let rest = eat_keywords(rest, &["REFERENCES"])?;
    let (ref_table, rest) = take_qualified_ident(rest)?;
    let (ref_columns, mut rest) = index_columns(rest)?;

    let mut on_delete = ReferentialAction::Restrict;
    let mut on_update = ReferentialAction::Restrict;
    loop {
        rest = rest.trim_start();
        if let Some(r) = eat_keywords(rest, &["ON", "DELETE"]) {
            let (action, r) = take_action(r);
            on_delete = action;
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["ON", "UPDATE"]) {
            let (action, r) = take_action(r);
            on_update = action;
            rest = r;
        } else if let Some(r) = eat_keywords(rest, &["MATCH"]) {
            rest = skip_value(r);
        } else {
            break;
        }
    }

    Some(ForeignKeySpec {
        name,
        columns,
        ref_table,
        ref_columns,
        on_delete,
        on_update,
    })
}

fn take_action(s: &str) -> (ReferentialAction, &str) {
    for words in [
        &["SET", "NULL"][..],
        &["SET", "DEFAULT"][..],
        &["NO", "ACTION"][..],
        &["CASCADE"][..],
        &["RESTRICT"][..],
    ] {
        if let Some(rest) = eat_keywords(s, words) {
            return (ReferentialAction::parse(&words.join(" ")), rest);
        }
    }
    (ReferentialAction::Restrict, skip_value(s))
}

/// Read `(col[(len)] [ASC|DESC], ...)` into bare column names.
fn index_columns(s: &str) -> Option<(Vec<String>, &str)> {
    let (inner, rest) = take_group(s)?;
    let mut columns = Vec::new();
    for part in split_top_level(inner) {
        // functional key parts like ((lower(col))) have no plain name
        let (name, _) = take_ident(part)?;
        columns.push(name);
    }
    if columns.is_empty() {
        return None;
    }
    Some((columns, rest))
}

fn eat_using(s: &str) -> &str {
    match eat_keywords(s, &["USING"]) {
        Some(rest) => take_ident(rest).map(|(_, r)| r).unwrap_or(rest),
        None => s,
    }
}

/// A DEFAULT value as written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DefaultToken {
    Quoted(String),
    Expr(String),
}

impl DefaultToken {
    fn into_default(self) -> ColumnDefault {
        match self {
            DefaultToken::Quoted(s) => ColumnDefault::Literal(s),
            DefaultToken::Expr(e) if e.eq_ignore_ascii_case("NULL") => ColumnDefault::Null,
            DefaultToken::Expr(e) => ColumnDefault::Expression(e),
        }
    }
}

/// Read one value: a string literal, `b'..'`/`x'..'`/charset-introduced
/// literal, a parenthesized expression, or a bare token such as
/// `CURRENT_TIMESTAMP(3)`.
fn take_value(s: &str) -> Option<(DefaultToken, &str)> {
    let s = s.trim_start();
    let first = s.chars().next()?;

    if first == '\'' || first == '"' {
        let (text, rest) = take_quoted(s)?;
        return Some((DefaultToken::Quoted(text), rest));
    }
    if first == '(' {
        let (inner, rest) = take_group(s)?;
        return Some((DefaultToken::Expr(format!("({})", inner.trim())), rest));
    }

    let word_end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    if word_end > 0 && s[word_end..].starts_with('\'') {
        let prefix = s[..word_end].to_ascii_lowercase();
        let (text, rest) = take_quoted(&s[word_end..])?;
        let token = match prefix.as_str() {
            "b" => DefaultToken::Expr(bits_to_decimal(&text)),
            "x" => DefaultToken::Expr(format!("'\\x{}'", text)),
            _ => DefaultToken::Quoted(text),
        };
        return Some((token, rest));
    }

    let end = s
        .find(|c: char| c.is_whitespace() || c == '(' || c == ',')
        .unwrap_or(s.len());
    let mut token = s[..end].to_string();
    let mut rest = &s[end..];
    if rest.starts_with('(') {
        let close = matching_paren(rest, 0)?;
        token.push_str(&rest[..=close]);
        rest = &rest[close + 1..];
    }
    if token.is_empty() {
        return None;
    }
    Some((DefaultToken::Expr(token), rest))
}

fn skip_value(s: &str) -> &str {
    match take_value(s) {
        Some((_, rest)) => rest,
        None => {
            // stray punctuation; drop one char
            let s = s.trim_start();
            let mut chars = s.chars();
            chars.next();
            chars.as_str()
        }
    }
}

pub(crate) fn bits_to_decimal(bits: &str) -> String {
    match u64::from_str_radix(bits, 2) {
        Ok(n) => n.to_string(),
        Err(_) => format!("B'{}'", bits),
    }
}

/// Read a quoted string, undoing doubled quotes and backslash escapes.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    let mut out = String::new();
    let mut iter = chars.peekable();
    while let Some((i, c)) = iter.next() {
        if c == '\\' {
            let (_, next) = iter.next()?;
            out.push(match next {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
        } else if c == quote {
            if matches!(iter.peek(), Some((_, n)) if *n == quote) {
                out.push(quote);
                iter.next();
            } else {
                return Some((out, &s[i + c.len_utf8()..]));
            }
        } else {
            out.push(c);
        }
    }
    None
}

/// Read a backtick-, double-quote- or bare identifier.
fn take_ident(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    let first = s.chars().next()?;
    match first {
        '`' | '"' => {
            let mut name = String::new();
            let mut iter = s[1..].char_indices().peekable();
            while let Some((i, c)) = iter.next() {
                if c == first {
                    if matches!(iter.peek(), Some((_, n)) if *n == first) {
                        name.push(first);
                        iter.next();
                        continue;
                    }
                    return Some((name, &s[1 + i + 1..]));
                }
                name.push(c);
            }
            None
        }
        c if is_ident_char(c) => {
            let end = s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len());
            Some((s[..end].to_string(), &s[end..]))
        }
        _ => None,
    }
}

/// Read `name` or `db.name`, keeping only the last part.
fn take_qualified_ident(s: &str) -> Option<(String, &str)> {
    let (mut name, mut rest) = take_ident(s)?;
    while let Some(after_dot) = rest.trim_start().strip_prefix('.') {
        let (next, r) = take_ident(after_dot)?;
        name = next;
        rest = r;
    }
    Some((name, rest))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Read a balanced `( ... )` group. Returns the inner text and the rest.
fn take_group(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if !s.starts_with('(') {
        return None;
    }
    let close = matching_paren(s, 0)?;
    Some((&s[1..close], &s[close + 1..]))
}

/// Byte index of the `)` closing the `(` at `open`, skipping quoted text.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in s[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are outside parentheses and quotes.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Match keywords at the start of `s`, case-insensitively, on word boundaries.
fn eat_keywords<'a>(s: &'a str, words: &[&str]) -> Option<&'a str> {
    let mut rest = s.trim_start();
    for word in words {
        if rest.len() < word.len() || !rest.is_char_boundary(word.len()) {
            return None;
        }
        let (head, tail) = rest.split_at(word.len());
        if !head.eq_ignore_ascii_case(word) {
            return None;
        }
        if tail.chars().next().is_some_and(is_ident_char) {
            return None;
        }
        rest = tail.trim_start();
    }
    Some(rest)
}

fn starts_with_any(s: &str, words: &[&str]) -> bool {
    words.iter().any(|w| eat_keywords(s, &[*w]).is_some())
}

fn first_word(s: &str) -> String {
    s.split_whitespace().next().unwrap_or("").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPOINTMENT: &str = r#"CREATE TABLE `Appointment` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `clientId` int(11) unsigned NOT NULL,
  `title` varchar(255) COLLATE utf8mb4_unicode_ci NOT NULL DEFAULT '',
  `notes` text CHARACTER SET utf8mb4 COMMENT 'free, text (notes)',
  `status` enum('open','closed') NOT NULL DEFAULT 'open',
  `active` tinyint(1) NOT NULL DEFAULT '1',
  `price` decimal(10,2) DEFAULT NULL,
  `createdAt` datetime(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
  `updatedAt` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
  `legacyDate` datetime NOT NULL DEFAULT '0000-00-00 00:00:00',
  PRIMARY KEY (`id`),
  UNIQUE KEY `Appointment_title_key` (`title`(191)),
  KEY `Appointment_clientId_idx` (`clientId`,`createdAt` DESC),
  FULLTEXT KEY `ft_notes` (`notes`),
  CONSTRAINT `Appointment_clientId_fkey` FOREIGN KEY (`clientId`) REFERENCES `Client` (`id`) ON DELETE CASCADE ON UPDATE SET NULL
) ENGINE=InnoDB AUTO_INCREMENT=1042 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci COMMENT='bookings'"#;

    #[test]
    fn test_parse_full_table() {
        let spec = parse_create_table(APPOINTMENT).unwrap();
        assert_eq!(spec.name, "Appointment");
        assert_eq!(spec.columns.len(), 10);
        assert_eq!(spec.primary_key, vec!["id"]);

        let id = &spec.columns[0];
        assert_eq!(id.source_type, "int(11)");
        assert!(id.auto_increment);
        assert!(!id.nullable);

        let client = spec.column("clientId").unwrap();
        assert_eq!(client.source_type, "int(11) unsigned");

        let notes = spec.column("notes").unwrap();
        assert_eq!(notes.source_type, "text");
        assert!(notes.nullable);
        assert!(notes.default.is_none());

        let status = spec.column("status").unwrap();
        assert_eq!(status.source_type, "enum('open','closed')");
        assert_eq!(status.default, Some(ColumnDefault::Literal("open".into())));

        let active = spec.column("active").unwrap();
        assert_eq!(active.default, Some(ColumnDefault::Literal("1".into())));

        let price = spec.column("price").unwrap();
        assert_eq!(price.default, Some(ColumnDefault::Null));

        let created = spec.column("createdAt").unwrap();
        assert_eq!(
            created.default,
            Some(ColumnDefault::Expression("CURRENT_TIMESTAMP(3)".into()))
        );

        let updated = spec.column("updatedAt").unwrap();
        assert_eq!(
            updated.default,
            Some(ColumnDefault::Expression("CURRENT_TIMESTAMP".into()))
        );
    }

    #[test]
    fn test_parse_indexes_and_foreign_keys() {
        let spec = parse_create_table(APPOINTMENT).unwrap();
        assert_eq!(spec.indexes.len(), 2);
        assert_eq!(spec.indexes[0].name, "Appointment_title_key");
        assert!(spec.indexes[0].unique);
        assert_eq!(spec.indexes[0].columns, vec!["title"]);
        assert_eq!(spec.indexes[1].columns, vec!["clientId", "createdAt"]);
        assert!(!spec.indexes[1].unique);

        assert_eq!(spec.foreign_keys.len(), 1);
        let fk = &spec.foreign_keys[0];
        assert_eq!(fk.name, "Appointment_clientId_fkey");
        assert_eq!(fk.columns, vec!["clientId"]);
        assert_eq!(fk.ref_table, "Client");
        assert_eq!(fk.ref_columns, vec!["id"]);
        assert_eq!(fk.on_delete, ReferentialAction::Cascade);
        assert_eq!(fk.on_update, ReferentialAction::SetNull);
    }

    #[test]
    fn test_if_not_exists_and_bare_identifiers() {
        let spec = parse_create_table(
            "create table if not exists shop.orders (id bigint not null, note varchar(20))",
        )
        .unwrap();
        assert_eq!(spec.name, "orders");
        assert_eq!(spec.column_names(), vec!["id", "note"]);
        assert!(!spec.columns[0].nullable);
    }

    #[test]
    fn test_double_quoted_identifiers() {
        let spec = parse_create_table(
            "CREATE TABLE \"public\".\"T\" (\n  \"order\" INTEGER NOT NULL,\n  \"x\"\"y\" TEXT\n);",
        )
        .unwrap();
        assert_eq!(spec.name, "T");
        assert_eq!(spec.column_names(), vec!["order", "x\"y"]);
    }

    #[test]
    fn test_version_comments_stripped() {
        let spec = parse_create_table(
            "CREATE TABLE `t` (`a` int(11) NOT NULL /*!80023 INVISIBLE */) /*!50100 PARTITION BY HASH (a) */",
        )
        .unwrap();
        assert_eq!(spec.columns.len(), 1);
        assert!(!spec.columns[0].nullable);
    }

    #[test]
    fn test_quoted_defaults_with_escapes() {
        let spec = parse_create_table(
            r#"CREATE TABLE `t` (`a` varchar(20) DEFAULT 'O''Brien', `b` varchar(20) DEFAULT 'it\'s, ok', `c` bit(1) DEFAULT b'1')"#,
        )
        .unwrap();
        assert_eq!(
            spec.columns[0].default,
            Some(ColumnDefault::Literal("O'Brien".into()))
        );
        assert_eq!(
            spec.columns[1].default,
            Some(ColumnDefault::Literal("it's, ok".into()))
        );
        assert_eq!(
            spec.columns[2].default,
            Some(ColumnDefault::Expression("1".into()))
        );
    }

    #[test]
    fn test_inline_primary_key_and_unique() {
        let spec =
            parse_create_table("CREATE TABLE `t` (`id` int PRIMARY KEY AUTO_INCREMENT, `code` char(3) UNIQUE)")
                .unwrap();
        assert_eq!(spec.primary_key, vec!["id"]);
        assert_eq!(spec.indexes.len(), 1);
        assert!(spec.indexes[0].unique);
        assert_eq!(spec.indexes[0].columns, vec!["code"]);
    }

    #[test]
    fn test_unnamed_foreign_key_gets_mysql_style_name() {
        let spec = parse_create_table(
            "CREATE TABLE `child` (`pid` int, FOREIGN KEY (`pid`) REFERENCES `parent` (`id`))",
        )
        .unwrap();
        assert_eq!(spec.foreign_keys[0].name, "child_ibfk_1");
        assert_eq!(spec.foreign_keys[0].on_delete, ReferentialAction::Restrict);
    }

    #[test]
    fn test_check_constraint_skipped() {
        let spec = parse_create_table(
            "CREATE TABLE `t` (`n` int, CONSTRAINT `chk_n` CHECK ((`n` > 0)))",
        )
        .unwrap();
        assert_eq!(spec.columns.len(), 1);
        assert!(spec.indexes.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_create_table("SELECT 1"),
            Err(MigrateError::Parse(_))
        ));
        assert!(matches!(
            parse_create_table("CREATE TABLE `t` (`a` int"),
            Err(MigrateError::Parse(_))
        ));
        assert!(matches!(
            parse_create_table("CREATE TABLE `t` (PRIMARY KEY (`a`))"),
            Err(MigrateError::Parse(_))
        ));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a int, b enum('x,y'), c decimal(10,2)"),
            vec!["a int", "b enum('x,y')", "c decimal(10,2)"]
        );
    }
}
