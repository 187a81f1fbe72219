//! BREAD metadata: which tables have admin screens, and how each column shows up.
//!
//! Records are addressed by table name. They reference tables, they don't own
//! them: a record can outlive its table (or a column), in which case the
//! synchronizer flags it instead of deleting it.

use std::sync::{Mutex, PoisonError};

use facet::Facet;
use indexmap::IndexMap;
use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::backend::BoxFuture;
use crate::inflect;
use crate::traced::{TracedObject, TracedPool};

/// Browse/Read/Edit/Add/Delete configuration for one table.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct BreadRecord {
    /// Table the record describes
    pub table: String,
    /// URL slug for the admin screens
    pub slug: String,
    pub display_name_singular: String,
    pub display_name_plural: String,
    #[facet(default)]
    pub model_name: Option<String>,
    #[facet(default)]
    pub icon: Option<String>,
    #[facet(default)]
    pub description: Option<String>,
    /// Paginate and search on the server instead of in the browser
    #[facet(default)]
    pub server_side: bool,
    /// Whether any field of the table is translatable
    #[facet(default)]
    pub translatable: bool,
    #[facet(default)]
    pub fields: Vec<FieldDefinition>,
}

/// How one column appears on the BREAD screens.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[facet(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Column the field shows
    pub column: String,
    /// Widget type (`text`, `text_area`, `checkbox`, ...)
    pub widget: String,
    pub display_name: String,
    #[facet(default)]
    pub required: bool,
    #[facet(default)]
    pub browse: bool,
    #[facet(default)]
    pub read: bool,
    #[facet(default)]
    pub edit: bool,
    #[facet(default)]
    pub add: bool,
    #[facet(default)]
    pub delete: bool,
    /// Free-form widget options, as JSON text
    #[facet(default)]
    pub details: Option<String>,
    #[facet(default)]
    pub order: u32,
    #[facet(default)]
    pub translatable: bool,
    /// Set when the column no longer exists
    #[facet(default)]
    pub orphaned: bool,
}

impl BreadRecord {
    /// A record with names derived from the table name and no fields.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let singular = inflect::singular(&inflect::title_case(&table));
        Self {
            slug: inflect::slug(&table),
            display_name_plural: inflect::plural(&singular),
            model_name: Some(inflect::studly(&inflect::singular(&table))),
            display_name_singular: singular,
            icon: None,
            description: None,
            server_side: false,
            translatable: false,
            fields: Vec::new(),
            table,
        }
    }

    pub fn field(&self, column: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn orphaned_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.orphaned)
            .map(|f| f.column.clone())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("metadata transaction already finished")]
    Finished,

    #[error("slug '{slug}' is already used by table '{table}'")]
    DuplicateSlug { slug: String, table: String },
}

/// Where BREAD records live.
pub trait MetadataStore: Send + Sync {
    fn load<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<BreadRecord>, MetadataError>>;

    /// Insert or replace the record for `record.table`.
    fn save<'a>(&'a self, record: &'a BreadRecord) -> BoxFuture<'a, Result<(), MetadataError>>;

    /// Returns whether a record existed.
    fn delete<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<bool, MetadataError>>;

    /// Tables that have a record, sorted.
    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>, MetadataError>>;
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<IndexMap<String, BreadRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut IndexMap<String, BreadRecord>) -> T) -> T {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut records)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<BreadRecord>, MetadataError>> {
        let record = self.with_records(|r| r.get(table).cloned());
        Box::pin(async move { Ok(record) })
    }

    fn save<'a>(&'a self, record: &'a BreadRecord) -> BoxFuture<'a, Result<(), MetadataError>> {
        let result = self.with_records(|records| {
            if let Some(other) = records
                .values()
                .find(|r| r.slug == record.slug && r.table != record.table)
            {
                return Err(MetadataError::DuplicateSlug {
                    slug: record.slug.clone(),
                    table: other.table.clone(),
                });
            }
            records.insert(record.table.clone(), record.clone());
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn delete<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<bool, MetadataError>> {
        let existed = self.with_records(|r| r.shift_remove(table).is_some());
        Box::pin(async move { Ok(existed) })
    }

    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>, MetadataError>> {
        let mut names: Vec<String> = self.with_records(|r| r.keys().cloned().collect());
        names.sort();
        Box::pin(async move { Ok(names) })
    }
}

/// SQL creating the tables [`PgMetadataStore`] keeps its records in.
pub const CREATE_METADATA_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS breadboard_data_types (
    table_name TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name_singular TEXT NOT NULL,
    display_name_plural TEXT NOT NULL,
    model_name TEXT,
    icon TEXT,
    description TEXT,
    server_side BOOLEAN NOT NULL DEFAULT false,
    translatable BOOLEAN NOT NULL DEFAULT false,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS breadboard_data_rows (
    table_name TEXT NOT NULL REFERENCES breadboard_data_types (table_name) ON DELETE CASCADE,
    column_name TEXT NOT NULL,
    widget TEXT NOT NULL,
    display_name TEXT NOT NULL,
    required BOOLEAN NOT NULL DEFAULT false,
    in_browse BOOLEAN NOT NULL DEFAULT false,
    in_read BOOLEAN NOT NULL DEFAULT false,
    in_edit BOOLEAN NOT NULL DEFAULT false,
    in_add BOOLEAN NOT NULL DEFAULT false,
    in_delete BOOLEAN NOT NULL DEFAULT false,
    details TEXT,
    ord INTEGER NOT NULL DEFAULT 0,
    translatable BOOLEAN NOT NULL DEFAULT false,
    orphaned BOOLEAN NOT NULL DEFAULT false,
    PRIMARY KEY (table_name, column_name)
);
"#;

const UPSERT_TYPE_SQL: &str = r#"
INSERT INTO breadboard_data_types
    (table_name, slug, display_name_singular, display_name_plural,
     model_name, icon, description, server_side, translatable)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (table_name) DO UPDATE SET
    slug = EXCLUDED.slug,
    display_name_singular = EXCLUDED.display_name_singular,
    display_name_plural = EXCLUDED.display_name_plural,
    model_name = EXCLUDED.model_name,
    icon = EXCLUDED.icon,
    description = EXCLUDED.description,
    server_side = EXCLUDED.server_side,
    translatable = EXCLUDED.translatable,
    updated_at = now()
"#;

const INSERT_ROW_SQL: &str = r#"
INSERT INTO breadboard_data_rows
    (table_name, column_name, widget, display_name, required,
     in_browse, in_read, in_edit, in_add, in_delete,
     details, ord, translatable, orphaned)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

const SELECT_TYPE_SQL: &str = r#"
SELECT slug, display_name_singular, display_name_plural, model_name, icon,
       description, server_side, translatable
FROM breadboard_data_types
WHERE table_name = $1
"#;

const SELECT_ROWS_SQL: &str = r#"
SELECT column_name, widget, display_name, required,
       in_browse, in_read, in_edit, in_add, in_delete,
       details, ord, translatable, orphaned
FROM breadboard_data_rows
WHERE table_name = $1
ORDER BY ord, column_name
"#;

/// BREAD records stored in two Postgres tables, one row per record and one per field.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: TracedPool,
}

impl PgMetadataStore {
    pub fn new(pool: TracedPool) -> Self {
        Self { pool }
    }

    /// Create the metadata tables if they don't exist.
    pub async fn ensure_tables(&self) -> Result<(), MetadataError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(CREATE_METADATA_TABLES_SQL).await?;
        Ok(())
    }

    /// Which table already uses `slug`.
    async fn slug_owner(&self, slug: &str) -> Result<Option<String>, MetadataError> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT table_name FROM breadboard_data_types WHERE slug = $1",
                &[&slug],
            )
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get(0)?),
            None => None,
        })
    }

    async fn save_in_transaction(
        conn: &TracedObject,
        record: &BreadRecord,
    ) -> Result<(), MetadataError> {
        conn.execute(
            UPSERT_TYPE_SQL,
            &[
                &record.table,
                &record.slug,
                &record.display_name_singular,
                &record.display_name_plural,
                &record.model_name,
                &record.icon,
                &record.description,
                &record.server_side,
                &record.translatable,
            ],
        )
        .await?;
        conn.execute(
            "DELETE FROM breadboard_data_rows WHERE table_name = $1",
            &[&record.table],
        )
        .await?;
        for field in &record.fields {
            let ord = i32::try_from(field.order).unwrap_or(i32::MAX);
            conn.execute(
                INSERT_ROW_SQL,
                &[
                    &record.table,
                    &field.column,
                    &field.widget,
                    &field.display_name,
                    &field.required,
                    &field.browse,
                    &field.read,
                    &field.edit,
                    &field.add,
                    &field.delete,
                    &field.details,
                    &ord,
                    &field.translatable,
                    &field.orphaned,
                ],
            )
            .await?;
        }
        Ok(())
    }
}

impl MetadataStore for PgMetadataStore {
    fn load<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<Option<BreadRecord>, MetadataError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let Some(row) = conn.query_opt(SELECT_TYPE_SQL, &[&table]).await? else {
                return Ok(None);
            };
            let rows = conn.query(SELECT_ROWS_SQL, &[&table]).await?;
            let mut fields = Vec::with_capacity(rows.len());
            for r in &rows {
                let ord: i32 = r.try_get(10)?;
                fields.push(FieldDefinition {
                    column: r.try_get(0)?,
                    widget: r.try_get(1)?,
                    display_name: r.try_get(2)?,
                    required: r.try_get(3)?,
                    browse: r.try_get(4)?,
                    read: r.try_get(5)?,
                    edit: r.try_get(6)?,
                    add: r.try_get(7)?,
                    delete: r.try_get(8)?,
                    details: r.try_get(9)?,
                    order: u32::try_from(ord).unwrap_or_default(),
                    translatable: r.try_get(11)?,
                    orphaned: r.try_get(12)?,
                });
            }
            Ok(Some(BreadRecord {
                table: table.to_string(),
                slug: row.try_get(0)?,
                display_name_singular: row.try_get(1)?,
                display_name_plural: row.try_get(2)?,
                model_name: row.try_get(3)?,
                icon: row.try_get(4)?,
                description: row.try_get(5)?,
                server_side: row.try_get(6)?,
                translatable: row.try_get(7)?,
                fields,
            }))
        })
    }

    fn save<'a>(&'a self, record: &'a BreadRecord) -> BoxFuture<'a, Result<(), MetadataError>> {
        Box::pin(async move {
            let tx = MetadataTransaction::begin(self.pool.get().await?).await?;
            let saved = Self::save_in_transaction(tx.conn()?, record).await;
            match saved {
                Ok(()) => {
                    tx.finish("COMMIT").await?;
                    tracing::info!(table = %record.table, fields = record.fields.len(), "saved BREAD record");
                    Ok(())
                }
                Err(e) => {
                    if let Err(rollback) = tx.finish("ROLLBACK").await {
                        tracing::warn!(error = %rollback, "rollback of BREAD save failed");
                    }
                    // Duplicate field columns violate a key too; only a slug
                    // held by another table is a slug conflict.
                    if is_unique_violation(&e)
                        && let Some(owner) = self.slug_owner(&record.slug).await?
                        && owner != record.table
                    {
                        return Err(MetadataError::DuplicateSlug {
                            slug: record.slug.clone(),
                            table: owner,
                        });
                    }
                    Err(e)
                }
            }
        })
    }

    fn delete<'a>(&'a self, table: &'a str) -> BoxFuture<'a, Result<bool, MetadataError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let affected = conn
                .execute(
                    "DELETE FROM breadboard_data_types WHERE table_name = $1",
                    &[&table],
                )
                .await?;
            Ok(affected > 0)
        })
    }

    fn tables(&self) -> BoxFuture<'_, Result<Vec<String>, MetadataError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn
                .query(
                    "SELECT table_name FROM breadboard_data_types ORDER BY table_name",
                    &[],
                )
                .await?;
            Ok(rows
                .iter()
                .map(|r| r.try_get::<_, String>(0))
                .collect::<Result<Vec<_>, _>>()?)
        })
    }
}

/// A BREAD save in progress.
///
/// If it is dropped before `COMMIT` or `ROLLBACK` completes (a timeout, a
/// failed rollback), the connection is detached from the pool so the open
/// transaction dies with it.
struct MetadataTransaction {
    conn: Option<TracedObject>,
}

impl MetadataTransaction {
    async fn begin(conn: TracedObject) -> Result<Self, MetadataError> {
        let tx = Self { conn: Some(conn) };
        tx.conn()?.batch_execute("BEGIN").await?;
        Ok(tx)
    }

    fn conn(&self) -> Result<&TracedObject, MetadataError> {
        self.conn.as_ref().ok_or(MetadataError::Finished)
    }

    async fn finish(mut self, stmt: &'static str) -> Result<(), MetadataError> {
        self.conn()?.batch_execute(stmt).await?;
        self.conn = None;
        Ok(())
    }
}

impl Drop for MetadataTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("BREAD save dropped with an open transaction, discarding connection");
            drop(conn.detach());
        }
    }
}

fn is_unique_violation(e: &MetadataError) -> bool {
    matches!(e, MetadataError::Postgres(pg) if pg.code() == Some(&SqlState::UNIQUE_VIOLATION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_names() {
        let record = BreadRecord::new("blog_categories");
        assert_eq!(record.slug, "blog-categories");
        assert_eq!(record.display_name_singular, "Blog Category");
        assert_eq!(record.display_name_plural, "Blog Categories");
        assert_eq!(record.model_name.as_deref(), Some("BlogCategory"));
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryMetadataStore::new();
        let record = BreadRecord::new("posts");
        store.save(&record).await.unwrap();
        assert_eq!(store.load("posts").await.unwrap(), Some(record));
        assert_eq!(store.tables().await.unwrap(), ["posts"]);
        assert!(store.delete("posts").await.unwrap());
        assert!(!store.delete("posts").await.unwrap());
        assert_eq!(store.load("posts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_slug() {
        let store = MemoryMetadataStore::new();
        store.save(&BreadRecord::new("posts")).await.unwrap();
        let mut other = BreadRecord::new("articles");
        other.slug = "posts".into();
        let err = store.save(&other).await.unwrap_err();
        assert!(matches!(err, MetadataError::DuplicateSlug { table, .. } if table == "posts"));
    }

    #[test]
    fn test_record_json_is_camel_case() {
        let json = r#"{
            "table": "posts",
            "slug": "posts",
            "displayNameSingular": "Post",
            "displayNamePlural": "Posts",
            "serverSide": true,
            "fields": [
                {"column": "title", "widget": "text", "displayName": "Title", "browse": true}
            ]
        }"#;
        let record: BreadRecord = facet_json::from_str(json).unwrap();
        assert!(record.server_side);
        assert_eq!(record.model_name, None);
        let title = record.field("title").unwrap();
        assert!(title.browse);
        assert!(!title.orphaned);
    }
}
