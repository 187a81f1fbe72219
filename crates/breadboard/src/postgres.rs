//! Postgres schema backend.

use breadboard_schema::{Dialect, SchemaOperation};
use breadboard_sql::advisory_lock_key;
use tokio_postgres::Row;

use crate::backend::{BackendError, BoxFuture, DdlSession, NativeColumn, SchemaBackend};
use crate::traced::{TracedObject, TracedPool};

const LIST_TABLES_SQL: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = current_schema()
  AND table_type = 'BASE TABLE'
"#;

const TABLE_EXISTS_SQL: &str = r#"
SELECT 1
FROM information_schema.tables
WHERE table_schema = current_schema()
  AND table_type = 'BASE TABLE'
  AND table_name = $1
"#;

const COLUMNS_SQL: &str = r#"
SELECT
    c.column_name::text,
    CASE WHEN c.data_type IN ('USER-DEFINED', 'ARRAY')
         THEN c.udt_name::text
         ELSE c.data_type::text
    END,
    c.character_maximum_length::int4,
    c.is_nullable = 'YES',
    c.column_default::text,
    c.ordinal_position::int4,
    c.is_identity = 'YES',
    EXISTS (
        SELECT 1
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
         AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = c.table_schema
          AND tc.table_name = c.table_name
          AND kcu.column_name = c.column_name
    )
FROM information_schema.columns c
WHERE c.table_schema = current_schema()
  AND c.table_name = $1
ORDER BY c.ordinal_position
"#;

/// Schema access over a Postgres connection pool.
///
/// DDL runs inside a transaction that first takes `pg_advisory_xact_lock` for
/// every table the plan touches, so engines in different processes serialize
/// on the same table too.
#[derive(Clone)]
pub struct PgBackend {
    pool: TracedPool,
}

impl PgBackend {
    pub fn new(pool: TracedPool) -> Self {
        Self { pool }
    }

    pub fn connect(url: &str) -> Result<Self, BackendError> {
        Ok(Self::new(TracedPool::from_url(url)?))
    }

    pub fn pool(&self) -> &TracedPool {
        &self.pool
    }
}

fn native_column(row: &Row) -> Result<NativeColumn, tokio_postgres::Error> {
    let length: Option<i32> = row.try_get(2)?;
    let ordinal: i32 = row.try_get(5)?;
    Ok(NativeColumn {
        name: row.try_get(0)?,
        data_type: row.try_get(1)?,
        length: length.and_then(|l| u32::try_from(l).ok()),
        nullable: row.try_get(3)?,
        default: row.try_get(4)?,
        ordinal: u32::try_from(ordinal).unwrap_or_default(),
        identity: row.try_get(6)?,
        primary_key: row.try_get(7)?,
    })
}

impl SchemaBackend for PgBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<String>, BackendError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn.query(LIST_TABLES_SQL, &[]).await?;
            let names = rows
                .iter()
                .map(|r| r.try_get::<_, String>(0))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }

    fn read_columns<'a>(
        &'a self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<NativeColumn>>, BackendError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            if conn.query_opt(TABLE_EXISTS_SQL, &[&table]).await?.is_none() {
                return Ok(None);
            }
            let rows = conn.query(COLUMNS_SQL, &[&table]).await?;
            let columns = rows
                .iter()
                .map(native_column)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(columns))
        })
    }

    fn begin<'a>(
        &'a self,
        lock_tables: &'a [String],
    ) -> BoxFuture<'a, Result<Box<dyn DdlSession>, BackendError>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let mut session = PgSession { conn: Some(conn) };
            session.start(lock_tables).await?;
            Ok(Box::new(session) as Box<dyn DdlSession>)
        })
    }
}

/// An open DDL transaction.
///
/// If the session is dropped before `commit` or `rollback` completes (a
/// timeout, a cancelled task), the connection is detached from the pool so
/// the half-finished transaction dies with it.
struct PgSession {
    conn: Option<TracedObject>,
}

impl PgSession {
    fn conn(&self) -> Result<&TracedObject, BackendError> {
        self.conn
            .as_ref()
            .ok_or_else(|| BackendError::Rejected("DDL session already finished".to_string()))
    }

    async fn start(&mut self, lock_tables: &[String]) -> Result<(), BackendError> {
        let conn = self.conn()?;
        conn.batch_execute("BEGIN").await?;
        for table in lock_tables {
            let key = advisory_lock_key(table);
            tracing::debug!(%table, key, "taking advisory lock");
            conn.execute("SELECT pg_advisory_xact_lock($1)", &[&key])
                .await?;
        }
        Ok(())
    }

    async fn finish(&mut self, stmt: &'static str) -> Result<(), BackendError> {
        self.conn()?.batch_execute(stmt).await?;
        // Back to the pool only once the transaction is closed.
        self.conn = None;
        Ok(())
    }
}

impl DdlSession for PgSession {
    fn apply<'a>(&'a mut self, op: &'a SchemaOperation) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            let statements = breadboard_sql::render_operation(Dialect::Postgres, op)?;
            let conn = self.conn()?;
            for stmt in &statements {
                conn.batch_execute(stmt).await?;
            }
            Ok(())
        })
    }

    fn commit(mut self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        Box::pin(async move { self.finish("COMMIT").await })
    }

    fn rollback(mut self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        Box::pin(async move { self.finish("ROLLBACK").await })
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("DDL session dropped with an open transaction, discarding connection");
            drop(conn.detach());
        }
    }
}
