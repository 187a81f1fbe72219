//! Plans the operations that turn a live table into a requested one.
//!
//! Planning is all-or-nothing: every request is validated against the current
//! table before a single operation is produced. Operations come out in a
//! fixed order:
//!
//! 1. table rename
//! 2. column drops
//! 3. column renames, ordered so each target name is free when it runs
//! 4. column adds
//! 5. column alterations (type, nullability, default)
//!
//! Requests describe desired state, so planning against a table that already
//! matches produces an empty plan: an `add` of an existing column is diffed
//! like a `keep`, a `rename` whose target already exists (and source doesn't,
//! or was re-added by the same request) counts as done, and dropping a missing
//! column is a no-op.

use std::collections::HashSet;

use breadboard_schema::{
    Column, ColumnAction, ColumnChange, ColumnDefault, ColumnRequest, Dialect, Plan,
    SchemaOperation, Table, TableRequest, TypeCatalog, TypeEntry,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Not in the catalog, or in it but not manageable (e.g. `money`).
    #[error("column '{column}': type '{type_name}' is unknown or not supported")]
    InvalidColumnType { column: String, type_name: String },

    #[error("column '{column}': {reason}")]
    ConflictingOperation { column: String, reason: String },

    #[error("column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("table '{0}' needs at least one column")]
    NoColumns(String),
}

fn conflict(column: &str, reason: impl Into<String>) -> PlanError {
    PlanError::ConflictingOperation {
        column: column.to_string(),
        reason: reason.into(),
    }
}

/// What a validated request turns into.
enum Step<'a> {
    Drop(&'a str),
    Rename {
        req: &'a ColumnRequest,
        entry: Option<&'static TypeEntry>,
        current: &'a Column,
    },
    Add {
        req: &'a ColumnRequest,
        entry: &'static TypeEntry,
    },
    /// Keep, retype, re-add of an existing column, or an already-applied rename.
    Keep {
        req: &'a ColumnRequest,
        entry: Option<&'static TypeEntry>,
        current: &'a Column,
    },
    Nothing,
}

pub struct Planner {
    catalog: &'static TypeCatalog,
}

impl Planner {
    pub fn new(catalog: &'static TypeCatalog) -> Self {
        Self { catalog }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(dialect.catalog())
    }

    /// Plan the changes from `current` to `desired`.
    pub fn plan(&self, current: &Table, desired: &TableRequest) -> Result<Plan, PlanError> {
        let steps = self.validate(current, desired)?;
        let table = desired.name.clone();
        let mut plan = Plan::new(&table);

        if current.name != desired.name {
            plan.operations.push(SchemaOperation::RenameTable {
                from: current.name.clone(),
                to: table.clone(),
            });
        }

        let mut dropped = 0u32;
        for step in &steps {
            if let Step::Drop(name) = step {
                dropped += 1;
                plan.operations.push(SchemaOperation::DropColumn {
                    table: table.clone(),
                    column: name.to_string(),
                });
            }
        }

        for (from, to) in order_renames(current, &steps)? {
            plan.operations.push(SchemaOperation::RenameColumn {
                table: table.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut ordinal = current.columns.len() as u32 - dropped;
        for step in &steps {
            if let Step::Add { req, entry } = step {
                ordinal += 1;
                let mut column = new_column(req, entry);
                column.ordinal = ordinal;
                plan.operations.push(SchemaOperation::AddColumn {
                    table: table.clone(),
                    column,
                });
            }
        }

        for step in &steps {
            let (req, entry, current) = match step {
                Step::Rename {
                    req,
                    entry,
                    current,
                }
                | Step::Keep {
                    req,
                    entry,
                    current,
                } => (*req, *entry, *current),
                _ => continue,
            };
            if let Some((column, changes)) = self.diff_column(req, entry, current) {
                plan.operations.push(SchemaOperation::AlterColumn {
                    table: table.clone(),
                    column,
                    changes,
                });
            }
        }

        tracing::info!(
            table = %plan.table,
            operations = plan.len(),
            "planned table changes"
        );
        Ok(plan)
    }

    /// Plan a table that doesn't exist yet.
    ///
    /// Every column is created; `drop` requests are ignored and renames or
    /// retypes fail because there is nothing to rename or retype.
    pub fn plan_create(&self, desired: &TableRequest) -> Result<Plan, PlanError> {
        let mut seen = HashSet::new();
        let mut table = Table::new(&desired.name);
        for req in &desired.columns {
            match &req.action {
                ColumnAction::Drop => continue,
                ColumnAction::Rename { .. } | ColumnAction::Retype => {
                    return Err(PlanError::ColumnNotFound {
                        table: desired.name.clone(),
                        column: req.source_name().to_string(),
                    });
                }
                ColumnAction::Keep | ColumnAction::Add => {}
            }
            if !seen.insert(req.name.as_str()) {
                return Err(conflict(&req.name, "requested more than once"));
            }
            let entry = self.resolve_type(req)?;
            table = table.with_column(new_column(req, entry));
        }
        if table.columns.is_empty() {
            return Err(PlanError::NoColumns(desired.name.clone()));
        }

        tracing::info!(table = %table.name, columns = table.columns.len(), "planned new table");
        let mut plan = Plan::new(&desired.name);
        plan.operations.push(SchemaOperation::CreateTable(table));
        Ok(plan)
    }

    /// Plan dropping a whole table.
    pub fn plan_drop(&self, table: &str) -> Plan {
        let mut plan = Plan::new(table);
        plan.operations.push(SchemaOperation::DropTable {
            table: table.to_string(),
        });
        plan
    }

    /// Resolve the type of a column about to be created. Unsupported entries
    /// can be read and kept, never created.
    fn resolve_type(&self, req: &ColumnRequest) -> Result<&'static TypeEntry, PlanError> {
        match self.catalog.get(&req.type_name) {
            Some(entry) if entry.supported => Ok(entry),
            _ => Err(invalid_type(req)),
        }
    }

    /// Resolve the requested type of an existing column.
    ///
    /// A column whose stored type is unsupported (or has no catalog entry at
    /// all) may keep that type; nothing can be changed to one.
    fn resolve_existing_type(
        &self,
        req: &ColumnRequest,
        current: &Column,
    ) -> Result<Option<&'static TypeEntry>, PlanError> {
        let current_entry = self.catalog.get(&current.type_name);
        match self.catalog.get(&req.type_name) {
            Some(entry) if entry.supported => Ok(Some(entry)),
            Some(entry) if current_entry.is_some_and(|c| c.name == entry.name) => Ok(Some(entry)),
            None if current.not_supported
                && current.type_name.eq_ignore_ascii_case(req.type_name.trim()) =>
            {
                Ok(None)
            }
            _ => Err(invalid_type(req)),
        }
    }

    fn validate<'a>(
        &self,
        current: &'a Table,
        desired: &'a TableRequest,
    ) -> Result<Vec<Step<'a>>, PlanError> {
        let mut targets: HashSet<&str> = HashSet::new();
        let mut rename_sources: HashSet<&str> = HashSet::new();
        let mut drops: HashSet<&str> = HashSet::new();
        let mut adds: HashSet<&str> = HashSet::new();

        for req in &desired.columns {
            match &req.action {
                ColumnAction::Drop => {
                    if !drops.insert(&req.name) {
                        return Err(conflict(&req.name, "dropped more than once"));
                    }
                }
                action => {
                    if matches!(action, ColumnAction::Add) {
                        adds.insert(&req.name);
                    }
                    if !targets.insert(&req.name) {
                        return Err(conflict(&req.name, "requested more than once"));
                    }
                    if let ColumnAction::Rename { from } = action
                        && from != &req.name
                        && !rename_sources.insert(from.as_str())
                    {
                        return Err(conflict(from, "renamed more than once"));
                    }
                }
            }
        }

        for req in &desired.columns {
            let name = req.name.as_str();
            match &req.action {
                ColumnAction::Drop => {
                    if rename_sources.contains(name) {
                        return Err(conflict(name, "both dropped and renamed"));
                    }
                }
                ColumnAction::Keep | ColumnAction::Retype if drops.contains(name) => {
                    return Err(conflict(name, "both dropped and kept"));
                }
                ColumnAction::Keep | ColumnAction::Retype if rename_sources.contains(name) => {
                    return Err(conflict(name, "both renamed and kept"));
                }
                _ => {}
            }
        }

        // `rename a -> b` plus `add a`, with both a and b present: already applied.
        let settled: HashSet<&str> = desired
            .columns
            .iter()
            .filter_map(|req| match &req.action {
                ColumnAction::Rename { from }
                    if from != &req.name
                        && adds.contains(from.as_str())
                        && current.has_column(from)
                        && current.has_column(&req.name)
                        && !drops.contains(req.name.as_str())
                        && !rename_sources.contains(req.name.as_str()) =>
                {
                    Some(from.as_str())
                }
                _ => None,
            })
            .collect();

        let mut steps = Vec::with_capacity(desired.columns.len());
        for req in &desired.columns {
            let step = match &req.action {
                ColumnAction::Drop => match current.column(&req.name) {
                    Some(_) => Step::Drop(&req.name),
                    None => Step::Nothing,
                },
                ColumnAction::Keep | ColumnAction::Retype => {
                    let current = current.column(&req.name).ok_or_else(|| {
                        PlanError::ColumnNotFound {
                            table: current.name.clone(),
                            column: req.name.clone(),
                        }
                    })?;
                    let entry = self.resolve_existing_type(req, current)?;
                    Step::Keep {
                        req,
                        entry,
                        current,
                    }
                }
                ColumnAction::Rename { from } => {
                    match (current.column(from), current.column(&req.name)) {
                        (Some(source), _) if from == &req.name => Step::Keep {
                            req,
                            entry: self.resolve_existing_type(req, source)?,
                            current: source,
                        },
                        (Some(_), Some(target)) if settled.contains(from.as_str()) => Step::Keep {
                            req,
                            entry: self.resolve_existing_type(req, target)?,
                            current: target,
                        },
                        (Some(source), occupied) => {
                            if occupied.is_some()
                                && !drops.contains(req.name.as_str())
                                && !rename_sources.contains(req.name.as_str())
                            {
                                return Err(conflict(&req.name, "already exists"));
                            }
                            Step::Rename {
                                req,
                                entry: self.resolve_existing_type(req, source)?,
                                current: source,
                            }
                        }
                        (None, Some(target)) => Step::Keep {
                            req,
                            entry: self.resolve_existing_type(req, target)?,
                            current: target,
                        },
                        (None, None) => {
                            return Err(PlanError::ColumnNotFound {
                                table: current.name.clone(),
                                column: from.clone(),
                            });
                        }
                    }
                }
                ColumnAction::Add => {
                    let name = req.name.as_str();
                    let freed = drops.contains(name)
                        || (rename_sources.contains(name) && !settled.contains(name));
                    match current.column(&req.name) {
                        Some(existing) if !freed => Step::Keep {
                            req,
                            entry: self.resolve_existing_type(req, existing)?,
                            current: existing,
                        },
                        _ => Step::Add {
                            req,
                            entry: self.resolve_type(req)?,
                        },
                    }
                }
            };
            steps.push(step);
        }
        Ok(steps)
    }

    /// Compare a requested column with its current definition.
    ///
    /// Returns the target definition and what changed, or `None` when the
    /// column already matches. Length only counts when the request names one;
    /// primary key and auto-increment are only set when a column is created.
    fn diff_column(
        &self,
        req: &ColumnRequest,
        entry: Option<&'static TypeEntry>,
        current: &Column,
    ) -> Option<(Column, Vec<ColumnChange>)> {
        let current_entry = self.catalog.get(&current.type_name);
        let mut changes = Vec::new();
        let mut target = current.clone();
        target.name = req.name.clone();

        if let Some(entry) = entry {
            let type_changed = current_entry.is_none_or(|c| c.name != entry.name);
            let length_changed =
                entry.accepts_length() && req.length.is_some() && req.length != current.length;
            if type_changed || length_changed {
                changes.push(ColumnChange::Type {
                    from: current.type_name.clone(),
                    to: entry.name.to_string(),
                    length: req.length,
                });
                target.type_name = entry.name.to_string();
                target.length = if entry.accepts_length() {
                    req.length.or(entry.default_length)
                } else {
                    None
                };
                target.not_supported = !entry.supported;
            }
        }

        if req.nullable != current.nullable {
            changes.push(ColumnChange::Nullable {
                from: current.nullable,
                to: req.nullable,
            });
            target.nullable = req.nullable;
        }

        if !current.auto_increment {
            let desired = req
                .default
                .as_deref()
                .and_then(|d| ColumnDefault::from_input(d, entry.or(current_entry)));
            if desired != current.default {
                changes.push(ColumnChange::Default {
                    from: current.default.clone(),
                    to: desired.clone(),
                });
                target.default = desired;
            }
        }

        (!changes.is_empty()).then_some((target, changes))
    }
}

fn invalid_type(req: &ColumnRequest) -> PlanError {
    PlanError::InvalidColumnType {
        column: req.name.clone(),
        type_name: req.type_name.clone(),
    }
}

fn new_column(req: &ColumnRequest, entry: &TypeEntry) -> Column {
    Column {
        name: req.name.clone(),
        type_name: entry.name.to_string(),
        length: if entry.accepts_length() {
            req.length
        } else {
            None
        },
        nullable: req.nullable && !req.primary_key,
        default: req
            .default
            .as_deref()
            .and_then(|d| ColumnDefault::from_input(d, Some(entry))),
        primary_key: req.primary_key,
        auto_increment: req.auto_increment,
        ordinal: 0,
        not_supported: !entry.supported,
    }
}

/// Order column renames so that every target name is free when its rename runs.
///
/// Simulates the column set after the drops, repeatedly scheduling any rename
/// whose target is free. If a full pass schedules nothing, the remaining
/// renames form a cycle (`a -> b`, `b -> a`) and cannot be expressed.
fn order_renames<'a>(current: &Table, steps: &[Step<'a>]) -> Result<Vec<(&'a str, &'a str)>, PlanError> {
    let dropped: HashSet<&str> = steps
        .iter()
        .filter_map(|s| match s {
            Step::Drop(name) => Some(*name),
            _ => None,
        })
        .collect();
    let mut names: HashSet<String> = current
        .columns
        .iter()
        .map(|c| c.name.clone())
        .filter(|n| !dropped.contains(n.as_str()))
        .collect();

    let mut pending: Vec<(&'a str, &'a str)> = steps
        .iter()
        .filter_map(|s| match s {
            Step::Rename { req, current, .. } => Some((current.name.as_str(), req.name.as_str())),
            _ => None,
        })
        .collect();

    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|(from, to)| {
            if names.contains(*to) {
                return true;
            }
            names.remove(*from);
            names.insert(to.to_string());
            ordered.push((*from, *to));
            false
        });
        if pending.len() == before {
            let mut involved: Vec<&str> = pending.iter().map(|(from, _)| *from).collect();
            involved.sort();
            return Err(conflict(
                pending[0].1,
                format!("rename cycle between {}", involved.join(", ")),
            ));
        }
    }
    Ok(ordered)
}
