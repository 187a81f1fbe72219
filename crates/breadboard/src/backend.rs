//! The seam between the engine and a concrete database.

use std::future::Future;
use std::pin::Pin;

use breadboard_schema::{Dialect, SchemaOperation};
use thiserror::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A column exactly as the database describes it, before catalog mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeColumn {
    pub name: String,
    /// Native type name (`character varying`, `int(11)`, ...)
    pub data_type: String,
    /// Character length, when the database reports one
    pub length: Option<u32>,
    pub nullable: bool,
    /// Default expression, verbatim
    pub default: Option<String>,
    /// 1-based position
    pub ordinal: u32,
    pub primary_key: bool,
    /// Identity / auto-increment column
    pub identity: bool,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("cannot create connection pool: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    #[error(transparent)]
    Render(#[from] breadboard_sql::RenderError),

    /// The backend refused an operation (e.g. the column it targets is gone).
    #[error("{0}")]
    Rejected(String),
}

/// Schema access for one database.
///
/// Implementations are shared between concurrent requests; exclusive access
/// to a table is arranged by the caller through [`TableLocks`](crate::TableLocks)
/// and whatever `begin` does with the lock keys.
pub trait SchemaBackend: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Whether a failed plan can be rolled back.
    fn transactional_ddl(&self) -> bool {
        self.dialect().transactional_ddl()
    }

    /// Names of all user tables, in any order.
    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<String>, BackendError>>;

    /// Columns of `table` in ordinal order, or `None` if the table doesn't exist.
    fn read_columns<'a>(
        &'a self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<NativeColumn>>, BackendError>>;

    /// Start a DDL session holding database-side locks on `lock_tables`.
    fn begin<'a>(
        &'a self,
        lock_tables: &'a [String],
    ) -> BoxFuture<'a, Result<Box<dyn DdlSession>, BackendError>>;
}

/// A unit of DDL work.
///
/// On a transactional backend nothing is visible until `commit`; dropping a
/// session without committing discards its work. On a non-transactional
/// backend every `apply` is durable immediately and `rollback` only releases
/// resources.
pub trait DdlSession: Send {
    fn apply<'a>(&'a mut self, op: &'a SchemaOperation) -> BoxFuture<'a, Result<(), BackendError>>;

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>>;

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>>;
}
