//! SQL text for breadboard.
//!
//! Renders schema operations to DDL for each supported dialect, quotes
//! identifiers and literals, and normalizes what databases report back about
//! column defaults.

use breadboard_schema::{ColumnDefault, Dialect};

mod render;
pub use render::*;

/// A SQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use breadboard_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A standard SQL identifier wrapper (Postgres, SQLite).
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use breadboard_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A MySQL identifier wrapper, quoted with backticks.
///
/// # Example
/// ```
/// use breadboard_sql::BacktickIdent;
/// assert_eq!(format!("{}", BacktickIdent("order")), "`order`");
/// assert_eq!(format!("{}", BacktickIdent("a`b")), "`a``b`");
/// ```
pub struct BacktickIdent<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for BacktickIdent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`")?;
        for c in self.0.as_ref().chars() {
            if c == '`' {
                write!(f, "``")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "`")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// A column default as SQL: text literals quoted, expressions verbatim.
pub fn default_sql(default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::Text(text) => escape_string(text),
        ColumnDefault::Raw(expr) => expr.clone(),
    }
}

/// Quote an identifier with double quotes.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote an identifier the way `dialect` expects.
pub fn quote_ident_for(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::MySql => format!("{}", BacktickIdent(name)),
        Dialect::Postgres | Dialect::Sqlite => quote_ident(name),
    }
}

/// Key for `pg_advisory_xact_lock` guarding DDL on a table.
///
/// Stable across processes, so two engines altering the same table serialize
/// on the database side as well.
pub fn advisory_lock_key(table: &str) -> i64 {
    let hash = blake3::hash(format!("breadboard:table:{table}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}

/// A column default as reported by introspection, with casts and quoting removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedDefault {
    /// The value without quotes; embedded quotes are unescaped.
    pub value: String,
    /// Whether the database reported a string literal.
    pub quoted: bool,
}

/// Normalize a default expression read back from `information_schema`.
///
/// Postgres reports `'draft'::character varying`, `(0)::numeric` or
/// `NULL::text`; MySQL and SQLite report plain values. Returns `None` when
/// there is no default (or it is `NULL`).
///
/// # Example
/// ```
/// use breadboard_sql::parse_introspected_default;
/// let d = parse_introspected_default("'it''s'::character varying").unwrap();
/// assert_eq!(d.value, "it's");
/// assert!(d.quoted);
/// assert!(parse_introspected_default("NULL::text").is_none());
/// ```
pub fn parse_introspected_default(raw: &str) -> Option<IntrospectedDefault> {
    let mut s = raw.trim();
    loop {
        let before = s.len();
        if let Some(pos) = last_top_level_cast(s) {
            s = s[..pos].trim_end();
        }
        if let Some(inner) = strip_outer_parens(s) {
            s = inner.trim();
        }
        if s.len() == before {
            break;
        }
    }

    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }

    if let Some(inner) = single_literal(s) {
        return Some(IntrospectedDefault {
            value: inner.replace("''", "'"),
            quoted: true,
        });
    }

    Some(IntrospectedDefault {
        value: s.to_string(),
        quoted: false,
    })
}

/// Whether an introspected default means the column is sequence-backed.
pub fn is_sequence_default(raw: &str) -> bool {
    raw.trim_start().to_ascii_lowercase().starts_with("nextval(")
}

/// Byte offset of the last `::` outside quotes and parentheses.
fn last_top_level_cast(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if in_quote {
            if b == b'\'' {
                if bytes.get(i + 1) == Some(&b'\'') {
                    i += 1;
                } else {
                    in_quote = false;
                }
            }
        } else {
            match b {
                b'\'' => in_quote = true,
                b'(' => depth += 1,
                b')' => depth -= 1,
                b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                    found = Some(i);
                    i += 1;
                }
                _ => {}
            }
        }
        i += 1;
    }
    found
}

/// The inside of `( ... )` when the first paren closes at the very end.
fn strip_outer_parens(s: &str) -> Option<&str> {
    if !s.starts_with('(') || !s.ends_with(')') {
        return None;
    }
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return (i == bytes.len() - 1).then(|| &s[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The body of `'...'` when `s` is exactly one string literal.
fn single_literal(s: &str) -> Option<&str> {
    if s.len() < 2 || !s.starts_with('\'') || !s.ends_with('\'') {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    // Every quote inside must be part of a doubled pair.
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' && chars.next() != Some('\'') {
            return None;
        }
    }
    Some(inner)
}
