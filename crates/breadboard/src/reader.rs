//! Read tables from a live database.

use std::sync::Arc;
use std::time::Duration;

use breadboard_schema::{Column, ColumnDefault, Table, TypeCatalog};
use breadboard_sql::{is_sequence_default, parse_introspected_default};
use facet::Facet;

use crate::backend::{NativeColumn, SchemaBackend};
use crate::error::{Error, Result, bounded};
use crate::meta::MetadataStore;

/// A table name plus whether a BREAD record exists for it.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct TableListing {
    pub name: String,
    pub has_bread: bool,
}

/// Introspects tables and maps them onto the type catalog. Takes no locks.
#[derive(Clone)]
pub struct SchemaReader {
    backend: Arc<dyn SchemaBackend>,
    catalog: &'static TypeCatalog,
    timeout: Duration,
}

impl SchemaReader {
    pub fn new(backend: Arc<dyn SchemaBackend>, timeout: Duration) -> Self {
        let catalog = backend.dialect().catalog();
        Self {
            backend,
            catalog,
            timeout,
        }
    }

    /// Table names, sorted.
    pub async fn tables(&self) -> Result<Vec<String>> {
        let mut names = bounded("list tables", self.timeout, self.backend.list_tables()).await?;
        names.sort();
        Ok(names)
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let columns = bounded("read columns", self.timeout, self.backend.read_columns(name)).await?;
        Ok(columns.is_some())
    }

    /// Describe one table, failing with [`Error::TableNotFound`] if it doesn't exist.
    pub async fn describe_table(&self, name: &str) -> Result<Table> {
        let native = bounded("read columns", self.timeout, self.backend.read_columns(name))
            .await?
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        Ok(Table {
            name: name.to_string(),
            columns: native.iter().map(|c| self.column(c)).collect(),
        })
    }

    /// Every table, with whether `store` has a BREAD record for it.
    pub async fn listing(&self, store: &dyn MetadataStore) -> Result<Vec<TableListing>> {
        let tables = self.tables().await?;
        let with_bread = bounded("list bread records", self.timeout, store.tables()).await?;
        Ok(tables
            .into_iter()
            .map(|name| {
                let has_bread = with_bread.contains(&name);
                TableListing { name, has_bread }
            })
            .collect())
    }

    fn column(&self, native: &NativeColumn) -> Column {
        let entry = self.catalog.resolve_native(&native.data_type);
        let (type_name, not_supported) = match entry {
            Some(e) => (e.name.to_string(), !e.supported),
            None => (native.data_type.to_ascii_lowercase(), true),
        };
        if not_supported {
            tracing::debug!(column = %native.name, native = %native.data_type, "column type not supported");
        }

        let sequence = native.default.as_deref().is_some_and(is_sequence_default);
        let auto_increment = native.identity || sequence;
        let default = if auto_increment {
            None
        } else {
            native
                .default
                .as_deref()
                .and_then(parse_introspected_default)
                .and_then(|d| ColumnDefault::from_introspected(&d.value, d.quoted, entry))
        };

        Column {
            name: native.name.clone(),
            type_name,
            length: entry
                .filter(|e| e.accepts_length())
                .and(native.length),
            nullable: native.nullable,
            default,
            primary_key: native.primary_key,
            auto_increment,
            ordinal: native.ordinal,
            not_supported,
        }
    }
}
