//! Column type catalogs, one per dialect.
//!
//! Each catalog is an ordered list of entries grouped by category. The order
//! is the order the type selector shows them in, and the first `Numbers` entry
//! is the fallback for unknown type names.

use crate::Dialect;
use facet::Facet;
use indexmap::IndexMap;

/// Category whose first entry is the fallback for unknown type names.
pub const DEFAULT_CATEGORY: &str = "Numbers";

/// A column type the admin UI can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    /// Category shown in the type selector (e.g. "Numbers", "Strings")
    pub category: &'static str,
    /// Canonical lowercase name
    pub name: &'static str,
    /// Other spellings, including the ones introspection reports
    pub aliases: &'static [&'static str],
    /// SQL keyword used in DDL
    pub sql: &'static str,
    /// Length used when the caller doesn't specify one; `None` if the type takes no length
    pub default_length: Option<u32>,
    /// False for types the engine knows about but cannot manage
    pub supported: bool,
}

impl TypeEntry {
    const fn new(category: &'static str, name: &'static str, sql: &'static str) -> Self {
        Self {
            category,
            name,
            aliases: &[],
            sql,
            default_length: None,
            supported: true,
        }
    }

    const fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    const fn length(mut self, length: u32) -> Self {
        self.default_length = Some(length);
        self
    }

    const fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Whether the type takes a length argument.
    pub fn accepts_length(&self) -> bool {
        self.default_length.is_some()
    }

    /// Whether literal defaults for this type must be quoted.
    pub fn quotes_literals(&self) -> bool {
        !matches!(self.category, "Numbers" | "Boolean")
    }

    /// Render the type for DDL, e.g. `VARCHAR(100)`.
    pub fn render(&self, length: Option<u32>) -> String {
        match length.or(self.default_length) {
            Some(len) if self.accepts_length() => format!("{}({len})", self.sql),
            _ => self.sql.to_string(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.name.eq_ignore_ascii_case(needle)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(needle))
    }
}

/// Result of a lenient type lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeLookup {
    Found(&'static TypeEntry),
    /// No entry matched; `fallback` is the catalog's default entry.
    Unknown {
        requested: String,
        fallback: &'static TypeEntry,
    },
}

impl TypeLookup {
    /// The matched entry, or the fallback.
    pub fn entry(&self) -> &'static TypeEntry {
        match self {
            TypeLookup::Found(entry) => entry,
            TypeLookup::Unknown { fallback, .. } => fallback,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeLookup::Unknown { .. })
    }
}

/// The set of column types available for one dialect.
#[derive(Debug)]
pub struct TypeCatalog {
    dialect: Dialect,
    entries: &'static [TypeEntry],
}

impl TypeCatalog {
    pub fn for_dialect(dialect: Dialect) -> &'static TypeCatalog {
        match dialect {
            Dialect::Postgres => &POSTGRES,
            Dialect::MySql => &MYSQL,
            Dialect::Sqlite => &SQLITE,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// All entries in display order.
    pub fn entries(&self) -> &'static [TypeEntry] {
        self.entries
    }

    /// Strict, case-insensitive lookup by canonical name or alias.
    pub fn get(&self, name: &str) -> Option<&'static TypeEntry> {
        let needle = name.trim();
        self.entries.iter().find(|e| e.matches(needle))
    }

    /// Lenient lookup: unknown names fall back to the default entry with a warning.
    pub fn lookup(&self, name: &str) -> TypeLookup {
        match self.get(name) {
            Some(entry) => TypeLookup::Found(entry),
            None => {
                let fallback = self.default_entry();
                tracing::warn!(
                    dialect = %self.dialect,
                    requested = %name,
                    fallback = fallback.name,
                    "unknown column type"
                );
                TypeLookup::Unknown {
                    requested: name.to_string(),
                    fallback,
                }
            }
        }
    }

    /// First entry of the `Numbers` category.
    pub fn default_entry(&self) -> &'static TypeEntry {
        self.entries
            .iter()
            .find(|e| e.category == DEFAULT_CATEGORY)
            .unwrap_or(&self.entries[0])
    }

    /// Map a type name reported by introspection onto the catalog.
    ///
    /// Handles parameterized spellings such as `varchar(255)` or `int(11) unsigned`
    /// by retrying with the base name.
    pub fn resolve_native(&self, native: &str) -> Option<&'static TypeEntry> {
        let native = native.trim();
        if let Some(entry) = self.get(native) {
            return Some(entry);
        }
        let unparameterized = native.split('(').next().unwrap_or(native).trim();
        if let Some(entry) = self.get(unparameterized) {
            return Some(entry);
        }
        let first_word = unparameterized.split(' ').next().unwrap_or(unparameterized);
        if first_word.len() < native.len() {
            self.get(first_word)
        } else {
            None
        }
    }

    /// Entries grouped by category, both in display order.
    pub fn list_by_category(&self) -> IndexMap<&'static str, Vec<&'static TypeEntry>> {
        let mut map: IndexMap<&'static str, Vec<&'static TypeEntry>> = IndexMap::new();
        for entry in self.entries {
            map.entry(entry.category).or_default().push(entry);
        }
        map
    }

    /// Serializable form for the type selector.
    pub fn listing(&self) -> CatalogListing {
        CatalogListing(
            self.list_by_category()
                .into_iter()
                .map(|(category, entries)| {
                    let options = entries
                        .into_iter()
                        .map(|e| TypeOption {
                            name: e.name.to_string(),
                            not_supported: !e.supported,
                        })
                        .collect();
                    (category.to_string(), options)
                })
                .collect(),
        )
    }
}

/// `{category: [{name, notSupported}]}`
#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(transparent)]
pub struct CatalogListing(pub IndexMap<String, Vec<TypeOption>>);

#[derive(Debug, Clone, PartialEq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct TypeOption {
    pub name: String,
    pub not_supported: bool,
}

impl CatalogListing {
    pub fn to_json(&self) -> Result<String, String> {
        facet_json::to_string(self).map_err(|e| e.to_string())
    }
}

const fn ty(category: &'static str, name: &'static str, sql: &'static str) -> TypeEntry {
    TypeEntry::new(category, name, sql)
}

static POSTGRES: TypeCatalog = TypeCatalog {
    dialect: Dialect::Postgres,
    entries: &[
        ty("Numbers", "smallint", "SMALLINT").aliases(&["int2"]),
        ty("Numbers", "integer", "INTEGER").aliases(&["int", "int4"]),
        ty("Numbers", "bigint", "BIGINT").aliases(&["int8"]),
        ty("Numbers", "numeric", "NUMERIC").aliases(&["decimal"]),
        ty("Numbers", "real", "REAL").aliases(&["float4"]),
        ty("Numbers", "double precision", "DOUBLE PRECISION").aliases(&["float8", "double"]),
        ty("Numbers", "money", "MONEY").unsupported(),
        ty("Strings", "char", "CHAR")
            .aliases(&["character", "bpchar"])
            .length(1),
        ty("Strings", "varchar", "VARCHAR")
            .aliases(&["character varying"])
            .length(255),
        ty("Strings", "text", "TEXT"),
        ty("Binary", "bytea", "BYTEA"),
        ty("Binary", "bit", "BIT").unsupported(),
        ty("Binary", "bit varying", "BIT VARYING")
            .aliases(&["varbit"])
            .unsupported(),
        ty("Boolean", "boolean", "BOOLEAN").aliases(&["bool"]),
        ty("Date and Time", "date", "DATE"),
        ty("Date and Time", "time", "TIME").aliases(&["time without time zone"]),
        ty("Date and Time", "timetz", "TIMETZ").aliases(&["time with time zone"]),
        ty("Date and Time", "timestamp", "TIMESTAMP").aliases(&["timestamp without time zone"]),
        ty("Date and Time", "timestamptz", "TIMESTAMPTZ")
            .aliases(&["timestamp with time zone"]),
        ty("Date and Time", "interval", "INTERVAL").unsupported(),
        ty("Objects", "json", "JSON"),
        ty("Objects", "jsonb", "JSONB"),
        ty("Objects", "uuid", "UUID"),
        ty("Objects", "xml", "XML").unsupported(),
        ty("Network", "cidr", "CIDR").unsupported(),
        ty("Network", "inet", "INET").unsupported(),
        ty("Network", "macaddr", "MACADDR").unsupported(),
        ty("Geometry", "point", "POINT").unsupported(),
        ty("Geometry", "line", "LINE").unsupported(),
        ty("Geometry", "lseg", "LSEG").unsupported(),
        ty("Geometry", "box", "BOX").unsupported(),
        ty("Geometry", "path", "PATH").unsupported(),
        ty("Geometry", "polygon", "POLYGON").unsupported(),
        ty("Geometry", "circle", "CIRCLE").unsupported(),
        ty("Text Search", "tsvector", "TSVECTOR").unsupported(),
        ty("Text Search", "tsquery", "TSQUERY").unsupported(),
    ],
};

static MYSQL: TypeCatalog = TypeCatalog {
    dialect: Dialect::MySql,
    entries: &[
        ty("Numbers", "tinyint", "TINYINT"),
        ty("Numbers", "smallint", "SMALLINT"),
        ty("Numbers", "mediumint", "MEDIUMINT"),
        ty("Numbers", "integer", "INT").aliases(&["int"]),
        ty("Numbers", "bigint", "BIGINT"),
        ty("Numbers", "decimal", "DECIMAL").aliases(&["numeric"]),
        ty("Numbers", "float", "FLOAT"),
        ty("Numbers", "double", "DOUBLE").aliases(&["double precision", "real"]),
        ty("Strings", "char", "CHAR").length(1),
        ty("Strings", "varchar", "VARCHAR").length(255),
        ty("Strings", "tinytext", "TINYTEXT"),
        ty("Strings", "text", "TEXT"),
        ty("Strings", "mediumtext", "MEDIUMTEXT"),
        ty("Strings", "longtext", "LONGTEXT"),
        ty("Binary", "binary", "BINARY").length(1),
        ty("Binary", "varbinary", "VARBINARY").length(255),
        ty("Binary", "tinyblob", "TINYBLOB"),
        ty("Binary", "blob", "BLOB"),
        ty("Binary", "mediumblob", "MEDIUMBLOB"),
        ty("Binary", "longblob", "LONGBLOB"),
        ty("Binary", "bit", "BIT").unsupported(),
        ty("Date and Time", "date", "DATE"),
        ty("Date and Time", "datetime", "DATETIME"),
        ty("Date and Time", "timestamp", "TIMESTAMP"),
        ty("Date and Time", "time", "TIME"),
        ty("Date and Time", "year", "YEAR"),
        ty("Lists", "enum", "ENUM").unsupported(),
        ty("Lists", "set", "SET").unsupported(),
        ty("Objects", "json", "JSON"),
        ty("Geometry", "geometry", "GEOMETRY").unsupported(),
        ty("Geometry", "point", "POINT").unsupported(),
        ty("Geometry", "linestring", "LINESTRING").unsupported(),
        ty("Geometry", "polygon", "POLYGON").unsupported(),
        ty("Geometry", "multipoint", "MULTIPOINT").unsupported(),
        ty("Geometry", "multilinestring", "MULTILINESTRING").unsupported(),
        ty("Geometry", "multipolygon", "MULTIPOLYGON").unsupported(),
        ty("Geometry", "geometrycollection", "GEOMETRYCOLLECTION").unsupported(),
    ],
};

static SQLITE: TypeCatalog = TypeCatalog {
    dialect: Dialect::Sqlite,
    entries: &[
        ty("Numbers", "integer", "INTEGER").aliases(&["int"]),
        ty("Numbers", "real", "REAL").aliases(&["double", "float"]),
        ty("Numbers", "numeric", "NUMERIC").aliases(&["decimal"]),
        ty("Boolean", "boolean", "BOOLEAN").aliases(&["bool"]),
        ty("Strings", "char", "CHAR").length(1),
        ty("Strings", "varchar", "VARCHAR")
            .aliases(&["character varying"])
            .length(255),
        ty("Strings", "text", "TEXT"),
        ty("Binary", "blob", "BLOB"),
        ty("Date and Time", "date", "DATE"),
        ty("Date and Time", "datetime", "DATETIME"),
        ty("Date and Time", "time", "TIME"),
        ty("Date and Time", "timestamp", "TIMESTAMP"),
    ],
};
