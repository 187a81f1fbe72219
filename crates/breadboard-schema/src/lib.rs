//! Schema types for breadboard.
//!
//! This crate contains the types shared between the type catalog, the diff
//! planner, the DDL renderer and the backends: live tables and columns, the
//! desired-state requests submitted by the admin UI, and the operations a
//! plan is made of.

mod catalog;
mod operation;
mod request;

pub use catalog::*;
pub use operation::*;
pub use request::*;

use std::fmt;
use std::str::FromStr;

/// Database families breadboard can introspect and alter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Whether DDL statements take part in transactions.
    ///
    /// MySQL commits implicitly before and after every DDL statement, so a
    /// failed plan there leaves its applied prefix in place.
    pub fn transactional_ddl(self) -> bool {
        match self {
            Dialect::Postgres | Dialect::Sqlite => true,
            Dialect::MySql => false,
        }
    }

    /// The type catalog for this dialect.
    pub fn catalog(self) -> &'static TypeCatalog {
        TypeCatalog::for_dialect(self)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Error returned when a dialect name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dialect '{0}' (expected postgres, mysql or sqlite)")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

/// A column default value.
///
/// Text literals are rendered single-quoted; everything else (numbers,
/// booleans, function calls, `CURRENT_TIMESTAMP`) is rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    /// A string literal, stored unquoted.
    Text(String),
    /// A number, boolean or SQL expression.
    Raw(String),
}

impl ColumnDefault {
    /// Classify a default as typed into the admin UI.
    ///
    /// Empty input and `NULL` mean "no default". Numbers and booleans are only
    /// raw for numeric and boolean column types; for any other type they are
    /// quoted like any other text.
    pub fn from_input(value: &str, entry: Option<&TypeEntry>) -> Option<ColumnDefault> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            return None;
        }
        if let Some(expr) = sql_expression(trimmed) {
            return Some(ColumnDefault::Raw(expr));
        }
        let literal_is_raw = entry.is_some_and(|e| !e.quotes_literals());
        if literal_is_raw {
            if is_number(trimmed) {
                return Some(ColumnDefault::Raw(trimmed.to_string()));
            }
            if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
                return Some(ColumnDefault::Raw(trimmed.to_ascii_lowercase()));
            }
        }
        Some(ColumnDefault::Text(value.to_string()))
    }

    /// Classify a default read back from the database.
    ///
    /// `quoted` tells whether the database reported a string literal. Quoted
    /// literals on textual columns stay text even when empty.
    pub fn from_introspected(
        value: &str,
        quoted: bool,
        entry: Option<&TypeEntry>,
    ) -> Option<ColumnDefault> {
        let textual = entry.is_none_or(|e| e.quotes_literals());
        if quoted && textual {
            return Some(ColumnDefault::Text(value.to_string()));
        }
        ColumnDefault::from_input(value, entry)
    }

    /// The value without quoting.
    pub fn as_str(&self) -> &str {
        match self {
            ColumnDefault::Text(s) | ColumnDefault::Raw(s) => s,
        }
    }

    /// Whether this default is a string literal.
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnDefault::Text(_))
    }
}

impl fmt::Display for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            ColumnDefault::Raw(s) => write!(f, "{s}"),
        }
    }
}

const KEYWORD_DEFAULTS: &[&str] = &[
    "CURRENT_TIMESTAMP",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "LOCALTIMESTAMP",
    "LOCALTIME",
];

/// Recognize SQL keyword defaults and function calls like `now()`.
fn sql_expression(value: &str) -> Option<String> {
    if let Some(kw) = KEYWORD_DEFAULTS
        .iter()
        .find(|kw| value.eq_ignore_ascii_case(kw))
    {
        return Some((*kw).to_string());
    }
    let open = value.find('(')?;
    let name = &value[..open];
    let is_call = value.ends_with(')')
        && !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    is_call.then(|| value.to_string())
}

fn is_number(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

/// A database column as it exists (or will exist) in a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Canonical catalog type name, or the native type name when unmapped
    pub type_name: String,
    /// Length for types that take one (e.g. `varchar(255)`)
    pub length: Option<u32>,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value (if any)
    pub default: Option<ColumnDefault>,
    /// Whether this column is (part of) the primary key
    pub primary_key: bool,
    /// Whether values are generated by the database (identity, serial, autoincrement)
    pub auto_increment: bool,
    /// 1-based position in the table
    pub ordinal: u32,
    /// Set when the stored type has no usable catalog entry
    pub not_supported: bool,
}

impl Column {
    /// A NOT NULL column with no default.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: None,
            nullable: false,
            default: None,
            primary_key: false,
            auto_increment: false,
            ordinal: 0,
            not_supported: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// A database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column, assigning the next ordinal position.
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.ordinal = self.columns.len() as u32 + 1;
        self.columns.push(column);
        self
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of the primary key columns, in ordinal order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests;
