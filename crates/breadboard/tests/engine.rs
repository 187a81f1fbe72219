//! End-to-end tests for the engine over the in-memory backend.
//!
//! `ScriptedBackend` wraps a `MemoryBackend` and can fail, cancel or stall at
//! a chosen operation, which is how partial failures and lock contention are
//! driven here.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use breadboard::{
    BackendError, BoxFuture, BreadRecord, CancelToken, Column, ColumnRequest as Col, DdlSession,
    Dialect, Disposition, Engine, Error, FailedStep, FailureReason, MemoryBackend,
    MemoryMetadataStore, MetadataOutcome, MetadataStore, NativeColumn, PlanError, ScaffoldRequest,
    Scaffolder, SchemaBackend, SchemaOperation, Table, TableRequest,
};

#[derive(Clone, Default)]
struct Script {
    /// 1-based operation that fails
    fail_at: Option<usize>,
    /// Cancel this token once this many operations went through
    cancel_after: Option<(usize, CancelToken)>,
    /// Sleep before every operation
    delay: Duration,
}

struct ScriptedBackend {
    inner: MemoryBackend,
    script: Script,
}

struct ScriptedSession {
    inner: Box<dyn DdlSession>,
    script: Script,
    seen: usize,
}

impl SchemaBackend for ScriptedBackend {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn transactional_ddl(&self) -> bool {
        self.inner.transactional_ddl()
    }

    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<String>, BackendError>> {
        self.inner.list_tables()
    }

    fn read_columns<'a>(
        &'a self,
        table: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<NativeColumn>>, BackendError>> {
        self.inner.read_columns(table)
    }

    fn begin<'a>(
        &'a self,
        lock_tables: &'a [String],
    ) -> BoxFuture<'a, Result<Box<dyn DdlSession>, BackendError>> {
        Box::pin(async move {
            let inner = self.inner.begin(lock_tables).await?;
            Ok(Box::new(ScriptedSession {
                inner,
                script: self.script.clone(),
                seen: 0,
            }) as Box<dyn DdlSession>)
        })
    }
}

impl DdlSession for ScriptedSession {
    fn apply<'a>(&'a mut self, op: &'a SchemaOperation) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move {
            self.seen += 1;
            if !self.script.delay.is_zero() {
                tokio::time::sleep(self.script.delay).await;
            }
            if self.script.fail_at == Some(self.seen) {
                return Err(BackendError::Rejected(format!("injected failure at {op}")));
            }
            self.inner.apply(op).await?;
            if let Some((after, token)) = &self.script.cancel_after
                && *after == self.seen
            {
                token.cancel();
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), BackendError>> {
        self.inner.rollback()
    }
}

fn posts() -> Table {
    Table::new("posts")
        .with_column(Column::new("id", "integer").primary_key().auto_increment())
        .with_column(Column::new("title", "varchar").length(255))
}

fn engine_over(backend: impl SchemaBackend + 'static) -> (Engine, Arc<MemoryMetadataStore>) {
    let store = Arc::new(MemoryMetadataStore::new());
    let engine = Engine::new(Arc::new(backend), store.clone()).with_timeout(Duration::from_secs(5));
    (engine, store)
}

fn scripted(inner: MemoryBackend, script: Script) -> ScriptedBackend {
    ScriptedBackend { inner, script }
}

/// Four operations: rename, then three adds.
fn four_step_request() -> TableRequest {
    TableRequest::new("posts")
        .column(Col::rename("title", "headline", "varchar"))
        .column(Col::add("body", "text").nullable())
        .column(Col::add("summary", "text").nullable())
        .column(Col::add("views", "integer").default_value("0"))
}

#[tokio::test]
async fn test_rename_and_add_then_replan_is_empty() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    let request = TableRequest::new("posts")
        .column(Col::rename("title", "headline", "varchar"))
        .column(Col::add("body", "text"));

    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    let kinds: Vec<_> = outcome.plan.iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, ["rename_column", "add_column"]);

    let table = match &outcome.result {
        breadboard::ApplyResult::Applied(applied) => applied.table.clone().unwrap(),
        other => panic!("expected success, got {other:?}"),
    };
    let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "headline", "body"]);

    let replan = engine.preview(&request).await.unwrap();
    assert!(replan.is_empty(), "{replan}");
}

fn native(name: &str, data_type: &str, ordinal: u32) -> NativeColumn {
    NativeColumn {
        name: name.into(),
        data_type: data_type.into(),
        length: None,
        nullable: true,
        default: None,
        ordinal,
        primary_key: false,
        identity: false,
    }
}

#[tokio::test]
async fn test_unsupported_column_survives_replan() {
    let backend = MemoryBackend::new(Dialect::Postgres);
    backend.insert_native(
        "jobs",
        vec![
            NativeColumn {
                nullable: false,
                primary_key: true,
                identity: true,
                ..native("id", "integer", 1)
            },
            native("wait", "interval", 2),
        ],
    );
    let (engine, _) = engine_over(backend);

    let wait = engine.describe("jobs").await.unwrap();
    assert!(wait.column("wait").unwrap().not_supported);

    let request = TableRequest::new("jobs")
        .column(Col::keep("wait", "interval").nullable())
        .column(Col::add("note", "text").nullable());
    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.result.is_applied(), "{:?}", outcome.result);
    let kinds: Vec<_> = outcome.plan.iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, ["add_column"]);

    let replan = engine.preview(&request).await.unwrap();
    assert!(replan.is_empty(), "{replan}");
}

#[tokio::test]
async fn test_rename_with_readd_replans_empty() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    let request = TableRequest::new("posts")
        .column(Col::rename("title", "headline", "varchar"))
        .column(Col::add("title", "varchar").length(255));

    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.result.is_applied(), "{:?}", outcome.result);

    let replan = engine.preview(&request).await.unwrap();
    assert!(replan.is_empty(), "{replan}");
    let again = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    assert!(again.plan.is_empty());
}

#[tokio::test]
async fn test_unknown_type_applies_nothing() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    let request = TableRequest::new("posts")
        .column(Col::add("body", "text"))
        .column(Col::add("rating", "foobar"));

    let err = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Plan(PlanError::InvalidColumnType { ref type_name, .. }) if type_name == "foobar"
    ));
    assert_eq!(engine.describe("posts").await.unwrap().columns.len(), 2);
}

#[tokio::test]
async fn test_failure_on_third_of_four_transactional() {
    let inner = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let backend = scripted(
        inner,
        Script {
            fail_at: Some(3),
            ..Script::default()
        },
    );
    let (engine, _) = engine_over(backend);

    let outcome = engine
        .update_table(&four_step_request(), &CancelToken::new())
        .await
        .unwrap();
    let failure = outcome.result.failure().unwrap();
    assert_eq!(failure.applied.len(), 2);
    assert!(matches!(
        &failure.failed_at,
        FailedStep::Operation(SchemaOperation::AddColumn { column, .. }) if column.name == "summary"
    ));
    assert_eq!(failure.pending.len(), 1);
    assert!(matches!(&failure.reason, FailureReason::Database(msg) if msg.contains("injected")));
    assert_eq!(failure.disposition, Disposition::RolledBack);
    assert_eq!(outcome.metadata, MetadataOutcome::Skipped);

    let table = engine.describe("posts").await.unwrap();
    assert!(table.has_column("title"));
    assert!(!table.has_column("body"));
}

#[tokio::test]
async fn test_failure_on_third_of_four_non_transactional() {
    let inner = MemoryBackend::new(Dialect::MySql)
        .non_transactional()
        .with_table(&posts());
    let backend = scripted(
        inner,
        Script {
            fail_at: Some(3),
            ..Script::default()
        },
    );
    let (engine, store) = engine_over(backend);
    let record = engine.prepopulate_bread("posts").await.unwrap();
    engine.save_bread(record).await.unwrap();

    let outcome = engine
        .update_table(&four_step_request(), &CancelToken::new())
        .await
        .unwrap();
    let failure = outcome.result.failure().unwrap();
    assert_eq!(failure.disposition, Disposition::PartiallyApplied);
    assert_eq!(failure.applied.len(), 2);
    assert_eq!(failure.pending.len(), 1);

    let table = engine.describe("posts").await.unwrap();
    assert!(table.has_column("headline"));
    assert!(table.has_column("body"));
    assert!(!table.has_column("summary"));

    // The applied prefix still reaches the metadata.
    let MetadataOutcome::Synced(report) = &outcome.metadata else {
        panic!("expected sync, got {:?}", outcome.metadata);
    };
    assert_eq!(report.orphaned, ["title"]);
    let saved = store.load("posts").await.unwrap().unwrap();
    assert_eq!(saved.orphaned_fields(), ["title"]);
}

#[tokio::test]
async fn test_cancel_between_operations() {
    let cancel = CancelToken::new();
    let inner = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let backend = scripted(
        inner,
        Script {
            cancel_after: Some((2, cancel.clone())),
            ..Script::default()
        },
    );
    let (engine, _) = engine_over(backend);

    let outcome = engine
        .update_table(&four_step_request(), &cancel)
        .await
        .unwrap();
    let failure = outcome.result.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Cancelled);
    assert_eq!(failure.applied.len(), 2);
    assert_eq!(failure.pending.len(), 1);
    assert_eq!(failure.disposition, Disposition::RolledBack);
    assert!(engine.describe("posts").await.unwrap().has_column("title"));
}

#[tokio::test]
async fn test_slow_operation_times_out() {
    let inner = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let backend = scripted(
        inner,
        Script {
            delay: Duration::from_millis(200),
            ..Script::default()
        },
    );
    let store = Arc::new(MemoryMetadataStore::new());
    let engine = Engine::new(Arc::new(backend), store).with_timeout(Duration::from_millis(50));

    let request = TableRequest::new("posts").column(Col::add("body", "text"));
    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    let failure = outcome.result.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Timeout(Duration::from_millis(50)));
    assert_eq!(failure.disposition, Disposition::NothingApplied);
}

#[tokio::test]
async fn test_concurrent_updates_serialize() {
    let inner = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let backend = scripted(
        inner,
        Script {
            delay: Duration::from_millis(50),
            ..Script::default()
        },
    );
    let (engine, _) = engine_over(backend);

    let first = TableRequest::new("posts").column(Col::add("body", "text"));
    // Only plannable once the first update is visible.
    let second = TableRequest::new("posts").column(Col::rename("body", "content", "text"));

    let cancel = CancelToken::new();

    let (a, b) = tokio::join!(engine.update_table(&first, &cancel), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(engine.locks().is_locked("posts"));
        engine.update_table(&second, &cancel).await
    });
    assert!(a.unwrap().result.is_applied());
    let b = b.unwrap();
    assert!(b.result.is_applied(), "{:?}", b.result);

    let table = engine.describe("posts").await.unwrap();
    assert!(table.has_column("content"));
    assert!(!table.has_column("body"));
    assert!(!engine.locks().is_locked("posts"));
}

#[tokio::test]
async fn test_drop_column_orphans_exactly_that_field() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    let record = engine.prepopulate_bread("posts").await.unwrap();
    engine.save_bread(record).await.unwrap();

    let request = TableRequest::new("posts").column(Col::drop("title"));
    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    let MetadataOutcome::Synced(report) = outcome.metadata else {
        panic!("expected sync");
    };
    assert_eq!(report.orphaned, ["title"]);

    let record = engine.bread("posts").await.unwrap().unwrap();
    let flags: Vec<_> = record
        .fields
        .iter()
        .map(|f| (f.column.as_str(), f.orphaned))
        .collect();
    assert_eq!(flags, [("id", false), ("title", true)]);
}

#[tokio::test]
async fn test_table_rename_reports_stale_record() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    engine.save_bread(BreadRecord::new("posts")).await.unwrap();

    let request = TableRequest::new("articles").renamed_from("posts");
    let outcome = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap();
    let MetadataOutcome::Synced(report) = outcome.metadata else {
        panic!("expected sync");
    };
    assert_eq!(report.stale_record.as_deref(), Some("posts"));
    assert_eq!(engine.stale_bread().await.unwrap(), ["posts"]);

    let listing = engine.tables().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "articles");
    assert!(!listing[0].has_bread);
}

#[tokio::test]
async fn test_rename_onto_existing_table_is_rejected() {
    let backend = MemoryBackend::new(Dialect::Postgres)
        .with_table(&posts())
        .with_table(&Table::new("articles").with_column(Column::new("id", "integer")));
    let (engine, _) = engine_over(backend);
    let request = TableRequest::new("articles").renamed_from("posts");
    let err = engine
        .update_table(&request, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableExists(t) if t == "articles"));
}

#[derive(Default)]
struct RecordingScaffolder {
    calls: Mutex<Vec<(String, ScaffoldRequest)>>,
}

impl Scaffolder for RecordingScaffolder {
    fn scaffold<'a>(
        &'a self,
        table: &'a Table,
        request: &'a ScaffoldRequest,
    ) -> BoxFuture<'a, Result<(), String>> {
        self.calls.lock().unwrap().push((table.name.clone(), *request));
        Box::pin(async { Ok(()) })
    }
}

#[tokio::test]
async fn test_create_table_runs_scaffolder() {
    let scaffolder = Arc::new(RecordingScaffolder::default());
    let store = Arc::new(MemoryMetadataStore::new());
    let engine = Engine::new(Arc::new(MemoryBackend::new(Dialect::Postgres)), store)
        .with_scaffolder(scaffolder.clone());

    let mut request = TableRequest::new("tags")
        .column(Col::add("id", "bigint").primary_key().auto_increment())
        .column(Col::add("label", "varchar").length(40));
    request.scaffold.create_model = true;

    let outcome = engine
        .create_table(&request, &CancelToken::new())
        .await
        .unwrap();
    assert!(outcome.result.is_applied());
    assert_eq!(outcome.scaffold_error, None);
    assert_eq!(
        scaffolder.calls.lock().unwrap().as_slice(),
        [("tags".to_string(), request.scaffold)]
    );

    let err = engine
        .create_table(&request, &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableExists(_)));
    assert_eq!(scaffolder.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dry_run_leaves_database_alone() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    let request = TableRequest::new("posts").column(Col::add("body", "text"));

    let (plan, result) = engine.dry_run(&request).await.unwrap();
    assert_eq!(plan.len(), 1);
    assert!(result.is_applied());
    assert!(!engine.describe("posts").await.unwrap().has_column("body"));
}

#[tokio::test]
async fn test_drop_table() {
    let backend = MemoryBackend::new(Dialect::Postgres).with_table(&posts());
    let (engine, _) = engine_over(backend);
    engine.save_bread(BreadRecord::new("posts")).await.unwrap();

    let outcome = engine.drop_table("posts", &CancelToken::new()).await.unwrap();
    assert!(outcome.result.is_applied());
    let MetadataOutcome::Synced(report) = outcome.metadata else {
        panic!("expected sync");
    };
    assert_eq!(report.stale_record.as_deref(), Some("posts"));
    assert!(matches!(
        engine.describe("posts").await,
        Err(Error::TableNotFound(_))
    ));
    assert!(matches!(
        engine.drop_table("posts", &CancelToken::new()).await,
        Err(Error::TableNotFound(_))
    ));
}
