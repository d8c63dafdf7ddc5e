//! Repair of JSON-like text with unquoted keys and values.
//!
//! Legacy rows hold values such as `[{date: 2025-02-02, time: 00:53}]`.
//! [`fix_json`] walks the structure (objects, arrays, scalars) and re-emits
//! it with every bare key and bare non-literal scalar quoted. Colons inside a
//! value belong to the value; only the first colon after a key separates.

use serde_json::Value;

/// Try to turn `text` into valid JSON. Returns `None` when the structure
/// cannot be followed or the result still fails to parse.
pub fn fix_json(text: &str) -> Option<String> {
    let mut repair = Repair {
        chars: text.trim().chars().collect(),
        pos: 0,
        out: String::with_capacity(text.len() + 16),
    };
    repair.value(&[])?;
    repair.skip_ws();
    if repair.pos != repair.chars.len() {
        return None;
    }
    serde_json::from_str::<Value>(&repair.out).ok()?;
    Some(repair.out)
}

struct Repair {
    chars: Vec<char>,
    pos: usize,
    out: String,
}

impl Repair {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self, terminators: &[char]) -> Option<()> {
        self.skip_ws();
        match self.peek()? {
            '{' => self.object(),
            '[' => self.array(),
            '"' => self.quoted(),
            _ => {
                let token = self.bare(terminators);
                self.scalar(&token);
                Some(())
            }
        }
    }

    fn object(&mut self) -> Option<()> {
        self.pos += 1;
        self.out.push('{');
        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            self.out.push('}');
            return Some(());
        }
        let mut first = true;
        loop {
            self.skip_ws();
            if !first {
                self.out.push_str(", ");
            }
            first = false;

            if self.peek()? == '"' {
                self.quoted()?;
            } else {
                let key = self.bare(&[':']);
                if key.is_empty() {
                    return None;
                }
                self.push_string(unquote_single(&key));
            }
            self.skip_ws();
            if self.peek()? != ':' {
                return None;
            }
            self.pos += 1;
            self.out.push_str(": ");
            self.value(&[',', '}'])?;
            self.skip_ws();
            match self.peek()? {
                ',' => self.pos += 1,
                '}' => {
                    self.pos += 1;
                    self.out.push('}');
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn array(&mut self) -> Option<()> {
        self.pos += 1;
        self.out.push('[');
        self.skip_ws();
        if self.peek() == Some(']') {
            self.pos += 1;
            self.out.push(']');
            return Some(());
        }
        let mut first = true;
        loop {
            if !first {
                self.out.push_str(", ");
            }
            first = false;
            self.value(&[',', ']'])?;
            self.skip_ws();
            match self.peek()? {
                ',' => self.pos += 1,
                ']' => {
                    self.pos += 1;
                    self.out.push(']');
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    /// Copy an already double-quoted string verbatim.
    fn quoted(&mut self) -> Option<()> {
        self.out.push('"');
        self.pos += 1;
        let mut escaped = false;
        loop {
            let c = self.peek()?;
            self.pos += 1;
            self.out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                return Some(());
            }
        }
    }

    /// Read up to the next terminator (or structural close) and trim.
    fn bare(&mut self, terminators: &[char]) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if terminators.contains(&c) || c == '}' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Numbers, booleans and null stay raw; everything else is quoted.
    fn scalar(&mut self, token: &str) {
        let is_literal = matches!(
            serde_json::from_str::<Value>(token),
            Ok(Value::Number(_) | Value::Bool(_) | Value::Null)
        );
        if is_literal {
            self.out.push_str(token);
        } else {
            self.push_string(unquote_single(token));
        }
    }

    fn push_string(&mut self, s: &str) {
        // serializing a &str cannot fail
        let encoded = serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s));
        self.out.push_str(&encoded);
    }
}

fn unquote_single(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        &token[1..token.len() - 1]
    } else {
        token
    }
}
