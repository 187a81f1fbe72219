//! An in-memory schema backend.
//!
//! Tables live in a shared map of native column descriptions, so the reader
//! maps them through the catalog exactly like it maps a live database. Every
//! operation is rendered for the backend's dialect before it is simulated, so
//! operations a real database of that dialect cannot run fail here too.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use breadboard_schema::{Column, Dialect, SchemaOperation, Table};
use indexmap::IndexMap;

use crate::backend::{BackendError, BoxFuture, DdlSession, NativeColumn, SchemaBackend};

type TableMap = IndexMap<String, Vec<NativeColumn>>;

#[derive(Clone)]
pub struct MemoryBackend {
    dialect: Dialect,
    transactional: bool,
    tables: Arc<Mutex<TableMap>>,
}

impl MemoryBackend {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            transactional: dialect.transactional_ddl(),
            tables: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Make every applied operation durable immediately, like MySQL.
    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn with_table(self, table: &Table) -> Self {
        self.insert_table(table);
        self
    }

    /// Insert or replace a table.
    pub fn insert_table(&self, table: &Table) {
        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| native_column(self.dialect, c, i as u32 + 1))
            .collect();
        self.lock().insert(table.name.clone(), columns);
    }

    /// Insert a table described in native terms, e.g. with types the catalog doesn't know.
    pub fn insert_native(&self, name: impl Into<String>, columns: Vec<NativeColumn>) {
        self.lock().insert(name.into(), columns);
    }

    fn lock(&self) -> MutexGuard<'_, TableMap> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchemaBackend for MemoryBackend {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn transactional_ddl(&self) -> bool {
        self.transactional
    }

    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<String>, BackendError>> {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        Box::pin(async move { Ok(names) })
    }

    fn read_columns<'a>(
        &'a self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<NativeColumn>>, BackendError>> {
        let columns = self.lock().get(table).cloned();
        Box::pin(async move { Ok(columns) })
    }

    fn begin<'a>(
        &'a self,
        _lock_tables: &'a [String],
    ) -> BoxFuture<'a, Result<Box<dyn DdlSession>, BackendError>> {
        let staged = self.transactional.then(|| self.lock().clone());
        let session = MemorySession {
            dialect: self.dialect,
            shared: Arc::clone(&self.tables),
            staged,
            touched: Vec::new(),
        };
        Box::pin(async move { Ok(Box::new(session) as Box<dyn DdlSession>) })
    }
}

struct MemorySession {
    dialect: Dialect,
    shared: Arc<Mutex<TableMap>>,
    /// Private copy for transactional sessions; `None` writes through.
    staged: Option<TableMap>,
    touched: Vec<String>,
}

impl DdlSession for MemorySession {
    fn apply<'a>(&'a mut self, op: &'a SchemaOperation) -> BoxFuture<'a, Result<(), BackendError>> {
        let result = breadboard_sql::render_operation(self.dialect, op)
            .map_err(BackendError::from)
            .and_then(|_| {
                match op {
                    SchemaOperation::RenameTable { from, to } => {
                        self.touched.push(from.clone());
                        self.touched.push(to.clone());
                    }
                    other => self.touched.push(other.table().to_string()),
                }
                match &mut self.staged {
                    Some(staged) => apply_operation(staged, self.dialect, op),
                    None => {
                        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
                        apply_operation(&mut shared, self.dialect, op)
                    }
                }
            });
        Box::pin(async move { result })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        let this = *self;
        if let Some(mut staged) = this.staged {
            let mut shared = this.shared.lock().unwrap_or_else(PoisonError::into_inner);
            // Only write back what this session touched; other tables may
            // have been changed by other sessions meanwhile.
            for name in &this.touched {
                match staged.shift_remove(name) {
                    Some(columns) => {
                        shared.insert(name.clone(), columns);
                    }
                    None => {
                        shared.shift_remove(name);
                    }
                }
            }
        }
        Box::pin(async { Ok(()) })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        Box::pin(async { Ok(()) })
    }
}

fn native_column(dialect: Dialect, column: &Column, ordinal: u32) -> NativeColumn {
    let entry = dialect.catalog().get(&column.type_name);
    let length = match entry {
        Some(e) if e.accepts_length() => column.length.or(e.default_length),
        _ => None,
    };
    NativeColumn {
        name: column.name.clone(),
        data_type: entry
            .map(|e| e.name.to_string())
            .unwrap_or_else(|| column.type_name.clone()),
        length,
        nullable: column.nullable && !column.primary_key,
        default: if column.auto_increment {
            None
        } else {
            column.default.as_ref().map(|d| d.to_string())
        },
        ordinal,
        primary_key: column.primary_key,
        identity: column.auto_increment,
    }
}

fn renumber(columns: &mut [NativeColumn]) {
    for (i, c) in columns.iter_mut().enumerate() {
        c.ordinal = i as u32 + 1;
    }
}

fn table_mut<'a>(
    tables: &'a mut TableMap,
    name: &str,
) -> Result<&'a mut Vec<NativeColumn>, BackendError> {
    tables
        .get_mut(name)
        .ok_or_else(|| BackendError::Rejected(format!("relation \"{name}\" does not exist")))
}

fn apply_operation(
    tables: &mut TableMap,
    dialect: Dialect,
    op: &SchemaOperation,
) -> Result<(), BackendError> {
    match op {
        SchemaOperation::CreateTable(table) => {
            if tables.contains_key(&table.name) {
                return Err(BackendError::Rejected(format!(
                    "relation \"{}\" already exists",
                    table.name
                )));
            }
            let columns = table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| native_column(dialect, c, i as u32 + 1))
                .collect();
            tables.insert(table.name.clone(), columns);
        }
        SchemaOperation::DropTable { table } => {
            if tables.shift_remove(table).is_none() {
                return Err(BackendError::Rejected(format!(
                    "table \"{table}\" does not exist"
                )));
            }
        }
        SchemaOperation::RenameTable { from, to } => {
            if tables.contains_key(to) {
                return Err(BackendError::Rejected(format!(
                    "relation \"{to}\" already exists"
                )));
            }
            let columns = tables.shift_remove(from).ok_or_else(|| {
                BackendError::Rejected(format!("relation \"{from}\" does not exist"))
            })?;
            tables.insert(to.clone(), columns);
        }
        SchemaOperation::AddColumn { table, column } => {
            let columns = table_mut(tables, table)?;
            if columns.iter().any(|c| c.name == column.name) {
                return Err(BackendError::Rejected(format!(
                    "column \"{}\" of relation \"{table}\" already exists",
                    column.name
                )));
            }
            let ordinal = columns.len() as u32 + 1;
            columns.push(native_column(dialect, column, ordinal));
        }
        SchemaOperation::DropColumn { table, column } => {
            let columns = table_mut(tables, table)?;
            let before = columns.len();
            columns.retain(|c| &c.name != column);
            if columns.len() == before {
                return Err(BackendError::Rejected(format!(
                    "column \"{column}\" of relation \"{table}\" does not exist"
                )));
            }
            renumber(columns);
        }
        SchemaOperation::RenameColumn { table, from, to } => {
            let columns = table_mut(tables, table)?;
            if columns.iter().any(|c| &c.name == to) {
                return Err(BackendError::Rejected(format!(
                    "column \"{to}\" of relation \"{table}\" already exists"
                )));
            }
            let col = columns
                .iter_mut()
                .find(|c| &c.name == from)
                .ok_or_else(|| {
                    BackendError::Rejected(format!(
                        "column \"{from}\" of relation \"{table}\" does not exist"
                    ))
                })?;
            col.name = to.clone();
        }
        SchemaOperation::AlterColumn { table, column, .. } => {
            let columns = table_mut(tables, table)?;
            let existing = columns
                .iter_mut()
                .find(|c| c.name == column.name)
                .ok_or_else(|| {
                    BackendError::Rejected(format!(
                        "column \"{}\" of relation \"{table}\" does not exist",
                        column.name
                    ))
                })?;
            let mut altered = native_column(dialect, column, existing.ordinal);
            altered.primary_key = existing.primary_key;
            altered.identity = existing.identity;
            if altered.identity {
                altered.default = None;
            }
            *existing = altered;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts() -> Table {
        Table::new("posts")
            .with_column(Column::new("id", "integer").primary_key().auto_increment())
            .with_column(Column::new("title", "varchar"))
    }

    #[tokio::test]
    async fn test_uncommitted_session_leaves_tables_alone() {
        let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
        let mut session = backend.begin(&[]).await.unwrap();
        session
            .apply(&SchemaOperation::DropColumn {
                table: "posts".into(),
                column: "title".into(),
            })
            .await
            .unwrap();
        session.rollback().await.unwrap();

        let columns = backend.read_columns("posts").await.unwrap().unwrap();
        assert_eq!(columns.len(), 2);
    }

    #[tokio::test]
    async fn test_non_transactional_writes_through() {
        let backend = MemoryBackend::new(Dialect::Postgres)
            .non_transactional()
            .with_table(&posts());
        let mut session = backend.begin(&[]).await.unwrap();
        session
            .apply(&SchemaOperation::RenameTable {
                from: "posts".into(),
                to: "articles".into(),
            })
            .await
            .unwrap();
        assert!(backend.read_columns("posts").await.unwrap().is_none());
        session.rollback().await.unwrap();
        assert!(backend.read_columns("articles").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_varchar_reads_back_default_length() {
        let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
        let columns = backend.read_columns("posts").await.unwrap().unwrap();
        assert_eq!(columns[1].length, Some(255));
        assert!(columns[0].identity);
        assert!(!columns[0].nullable);
    }

    #[tokio::test]
    async fn test_rejects_operations_the_dialect_cannot_render() {
        let backend = MemoryBackend::new(Dialect::Sqlite).with_table(&posts());
        let mut session = backend.begin(&[]).await.unwrap();
        let err = session
            .apply(&SchemaOperation::AlterColumn {
                table: "posts".into(),
                column: Column::new("title", "text"),
                changes: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Render(_)));
    }
}
