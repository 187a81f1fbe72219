//! Schema operations and plans.

use crate::{Column, ColumnDefault, Table};
use std::fmt;

/// A single schema-altering step.
///
/// Every variant names the table it targets. Column-level variants refer to
/// the table by the name it has at the point the operation runs, so after a
/// `RenameTable` they use the new name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOperation {
    /// Create a table with the given columns.
    CreateTable(Table),
    /// Drop a table.
    DropTable { table: String },
    /// Rename a table.
    RenameTable { from: String, to: String },
    /// Add a column.
    AddColumn { table: String, column: Column },
    /// Drop a column.
    DropColumn { table: String, column: String },
    /// Rename a column.
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    /// Change type, nullability and/or default of a column.
    ///
    /// `column` is the full target definition (some dialects can only restate
    /// a column, not patch it); `changes` lists what actually differs.
    AlterColumn {
        table: String,
        column: Column,
        changes: Vec<ColumnChange>,
    },
}

/// One attribute of a column that an `AlterColumn` changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnChange {
    Type {
        from: String,
        to: String,
        length: Option<u32>,
    },
    Nullable {
        from: bool,
        to: bool,
    },
    Default {
        from: Option<ColumnDefault>,
        to: Option<ColumnDefault>,
    },
}

impl SchemaOperation {
    /// The table this operation targets (the new name for `RenameTable`).
    pub fn table(&self) -> &str {
        match self {
            SchemaOperation::CreateTable(t) => &t.name,
            SchemaOperation::DropTable { table }
            | SchemaOperation::AddColumn { table, .. }
            | SchemaOperation::DropColumn { table, .. }
            | SchemaOperation::RenameColumn { table, .. }
            | SchemaOperation::AlterColumn { table, .. } => table,
            SchemaOperation::RenameTable { to, .. } => to,
        }
    }

    /// Short name of the operation kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaOperation::CreateTable(_) => "create_table",
            SchemaOperation::DropTable { .. } => "drop_table",
            SchemaOperation::RenameTable { .. } => "rename_table",
            SchemaOperation::AddColumn { .. } => "add_column",
            SchemaOperation::DropColumn { .. } => "drop_column",
            SchemaOperation::RenameColumn { .. } => "rename_column",
            SchemaOperation::AlterColumn { .. } => "alter_column",
        }
    }

    pub fn is_table_level(&self) -> bool {
        matches!(
            self,
            SchemaOperation::CreateTable(_)
                | SchemaOperation::DropTable { .. }
                | SchemaOperation::RenameTable { .. }
        )
    }
}

impl fmt::Display for SchemaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOperation::CreateTable(t) => write!(f, "+ table {}", t.name),
            SchemaOperation::DropTable { table } => write!(f, "- table {table}"),
            SchemaOperation::RenameTable { from, to } => {
                write!(f, "~ rename table {from} -> {to}")
            }
            SchemaOperation::AddColumn { column, .. } => {
                write!(f, "+ {}: {}", column.name, type_label(column))?;
                if column.nullable {
                    write!(f, " (nullable)")?;
                }
                if let Some(default) = &column.default {
                    write!(f, " default {default}")?;
                }
                Ok(())
            }
            SchemaOperation::DropColumn { column, .. } => write!(f, "- {column}"),
            SchemaOperation::RenameColumn { from, to, .. } => write!(f, "~ rename {from} -> {to}"),
            SchemaOperation::AlterColumn {
                column, changes, ..
            } => {
                let parts: Vec<String> = changes.iter().map(|c| c.to_string()).collect();
                write!(f, "~ {}: {}", column.name, parts.join(", "))
            }
        }
    }
}

impl fmt::Display for ColumnChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnChange::Type { from, to, length } => match length {
                Some(len) => write!(f, "{from} -> {to}({len})"),
                None => write!(f, "{from} -> {to}"),
            },
            ColumnChange::Nullable { from, to } => {
                let label = |n: bool| if n { "nullable" } else { "not null" };
                write!(f, "{} -> {}", label(*from), label(*to))
            }
            ColumnChange::Default { from, to } => {
                let label = |d: &Option<ColumnDefault>| {
                    d.as_ref()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "(none)".to_string())
                };
                write!(f, "default {} -> {}", label(from), label(to))
            }
        }
    }
}

fn type_label(column: &Column) -> String {
    match column.length {
        Some(len) => format!("{}({len})", column.type_name),
        None => column.type_name.clone(),
    }
}

/// An ordered list of operations for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Table the plan targets, by its name after the plan runs.
    pub table: String,
    /// Operations in execution order.
    pub operations: Vec<SchemaOperation>,
}

impl Plan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaOperation> {
        self.operations.iter()
    }

    /// Name the table had before the plan, if the plan renames it.
    pub fn renamed_from(&self) -> Option<&str> {
        self.operations.iter().find_map(|op| match op {
            SchemaOperation::RenameTable { from, .. } => Some(from.as_str()),
            _ => None,
        })
    }

    /// Whether the table is gone once the plan has run.
    pub fn drops_table(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, SchemaOperation::DropTable { .. }))
    }

    /// Every table name the plan touches, sorted and deduplicated.
    ///
    /// These are the names that must be locked while the plan runs.
    pub fn touched_tables(&self) -> Vec<String> {
        let mut names = vec![self.table.clone()];
        for op in &self.operations {
            match op {
                SchemaOperation::RenameTable { from, to } => {
                    names.push(from.clone());
                    names.push(to.clone());
                }
                other => names.push(other.table().to_string()),
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "{}: no changes", self.table);
        }
        writeln!(f, "{}:", self.table)?;
        for op in &self.operations {
            writeln!(f, "  {op}")?;
        }
        Ok(())
    }
}
