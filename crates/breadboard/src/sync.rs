//! Keeps BREAD records in line with the live schema.
//!
//! Fields whose column disappears are flagged `orphaned`, never deleted, so an
//! operator can see what the admin screens lost. New columns get no field
//! until someone saves the record.

use std::sync::Arc;

use breadboard_schema::{Column, Plan, Table, TypeCatalog};

use crate::inflect;
use crate::meta::{BreadRecord, FieldDefinition, MetadataError, MetadataStore};

/// What [`MetadataSynchronizer::sync`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub table: String,
    pub record_found: bool,
    /// Fields newly marked orphaned
    pub orphaned: Vec<String>,
    /// Fields whose column came back
    pub restored: Vec<String>,
    /// A record left under a name that no longer exists (renamed or dropped table)
    pub stale_record: Option<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.stale_record.is_none()
    }
}

#[derive(Clone)]
pub struct MetadataSynchronizer {
    store: Arc<dyn MetadataStore>,
    catalog: &'static TypeCatalog,
}

/// Flag fields against `table`. Returns (newly orphaned, restored).
fn mark_orphans(record: &mut BreadRecord, table: &Table) -> (Vec<String>, Vec<String>) {
    let mut orphaned = Vec::new();
    let mut restored = Vec::new();
    for field in &mut record.fields {
        let exists = table.has_column(&field.column);
        if !exists && !field.orphaned {
            field.orphaned = true;
            orphaned.push(field.column.clone());
        } else if exists && field.orphaned {
            field.orphaned = false;
            restored.push(field.column.clone());
        }
    }
    (orphaned, restored)
}

impl MetadataSynchronizer {
    pub fn new(store: Arc<dyn MetadataStore>, catalog: &'static TypeCatalog) -> Self {
        Self { store, catalog }
    }

    /// Bring the record for `plan.table` in line after a successful apply.
    ///
    /// `table` is the re-read table, `None` when it was dropped or couldn't be read.
    pub async fn sync(&self, plan: &Plan, table: Option<&Table>) -> Result<SyncReport, MetadataError> {
        let mut report = SyncReport {
            table: plan.table.clone(),
            ..SyncReport::default()
        };

        if plan.drops_table() {
            if self.store.load(&plan.table).await?.is_some() {
                tracing::warn!(table = %plan.table, "BREAD record left for dropped table");
                report.record_found = true;
                report.stale_record = Some(plan.table.clone());
            }
            return Ok(report);
        }

        if let Some(old) = plan.renamed_from()
            && self.store.load(old).await?.is_some()
        {
            tracing::warn!(from = %old, to = %plan.table, "BREAD record left under old table name");
            report.stale_record = Some(old.to_string());
        }

        let Some(mut record) = self.store.load(&plan.table).await? else {
            return Ok(report);
        };
        report.record_found = true;
        let Some(table) = table else {
            return Ok(report);
        };

        let (orphaned, restored) = mark_orphans(&mut record, table);
        if !orphaned.is_empty() || !restored.is_empty() {
            self.store.save(&record).await?;
            tracing::info!(table = %plan.table, ?orphaned, ?restored, "BREAD fields updated");
        }
        report.orphaned = orphaned;
        report.restored = restored;
        Ok(report)
    }

    /// Save `record`, with orphan flags computed against the live `table`.
    pub async fn save(&self, mut record: BreadRecord, table: &Table) -> Result<BreadRecord, MetadataError> {
        record.table = table.name.clone();
        mark_orphans(&mut record, table);
        self.store.save(&record).await?;
        Ok(record)
    }

    pub async fn delete(&self, table: &str) -> Result<bool, MetadataError> {
        self.store.delete(table).await
    }

    /// A suggested record for `table`: one field per column.
    pub fn prepopulate(&self, table: &Table) -> BreadRecord {
        let mut record = BreadRecord::new(&table.name);
        record.fields = table.columns.iter().map(|c| self.field_for(c)).collect();
        record
    }

    /// Records whose table is not in `live_tables`.
    pub async fn stale_records(&self, live_tables: &[String]) -> Result<Vec<String>, MetadataError> {
        let mut stale = self.store.tables().await?;
        stale.retain(|t| !live_tables.contains(t));
        Ok(stale)
    }

    fn field_for(&self, column: &Column) -> FieldDefinition {
        let hidden = column.primary_key && column.auto_increment;
        let managed = matches!(column.name.as_str(), "created_at" | "updated_at" | "deleted_at");
        let editable = !hidden && !managed && !column.not_supported;
        FieldDefinition {
            column: column.name.clone(),
            widget: self.widget_for(column).to_string(),
            display_name: inflect::title_case(&column.name),
            required: !column.nullable && column.default.is_none() && !column.auto_increment,
            browse: true,
            read: true,
            edit: editable,
            add: editable,
            delete: editable,
            details: None,
            order: column.ordinal,
            translatable: false,
            orphaned: false,
        }
    }

    fn widget_for(&self, column: &Column) -> &'static str {
        if column.primary_key && column.auto_increment {
            return "hidden";
        }
        let Some(entry) = self.catalog.get(&column.type_name) else {
            return "text";
        };
        match (entry.category, entry.name) {
            ("Numbers", _) => "number",
            ("Boolean", _) => "checkbox",
            ("Date and Time", "date") => "date",
            ("Date and Time", "time" | "timetz") => "time",
            ("Date and Time", _) => "timestamp",
            ("Objects", "json" | "jsonb") => "code_editor",
            ("Strings", "char" | "varchar") => "text",
            ("Strings", _) => "text_area",
            _ => "text",
        }
    }
}
