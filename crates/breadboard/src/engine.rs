//! The entry point the admin screens talk to.

use std::sync::Arc;
use std::time::Duration;

use breadboard_schema::{Plan, ScaffoldRequest, Table, TableRequest, TypeCatalog};

use crate::applier::{Applier, ApplyResult, CancelToken, Disposition};
use crate::backend::{BoxFuture, SchemaBackend};
use crate::error::{Error, Result, bounded};
use crate::lock::TableLocks;
use crate::memory::MemoryBackend;
use crate::meta::{BreadRecord, MetadataStore};
use crate::planner::Planner;
use crate::reader::{SchemaReader, TableListing};
use crate::sync::{MetadataSynchronizer, SyncReport};

/// Timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Side actions requested alongside a table change (model class, migration
/// file). Only invoked after the change was applied.
pub trait Scaffolder: Send + Sync {
    fn scaffold<'a>(
        &'a self,
        table: &'a Table,
        request: &'a ScaffoldRequest,
    ) -> BoxFuture<'a, std::result::Result<(), String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    Synced(SyncReport),
    /// Nothing reached the database, so there was nothing to sync.
    Skipped,
    Failed(String),
}

/// Result of a create, update or drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub plan: Plan,
    pub result: ApplyResult,
    pub metadata: MetadataOutcome,
    pub scaffold_error: Option<String>,
}

pub struct Engine {
    backend: Arc<dyn SchemaBackend>,
    store: Arc<dyn MetadataStore>,
    reader: SchemaReader,
    planner: Planner,
    applier: Applier,
    sync: MetadataSynchronizer,
    locks: TableLocks,
    timeout: Duration,
    scaffolder: Option<Arc<dyn Scaffolder>>,
}

impl Engine {
    pub fn new(backend: Arc<dyn SchemaBackend>, store: Arc<dyn MetadataStore>) -> Self {
        let catalog = backend.dialect().catalog();
        Self {
            reader: SchemaReader::new(Arc::clone(&backend), DEFAULT_TIMEOUT),
            planner: Planner::new(catalog),
            applier: Applier::new(Arc::clone(&backend), DEFAULT_TIMEOUT),
            sync: MetadataSynchronizer::new(Arc::clone(&store), catalog),
            locks: TableLocks::new(),
            timeout: DEFAULT_TIMEOUT,
            scaffolder: None,
            backend,
            store,
        }
    }

    /// Bound every database call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.reader = SchemaReader::new(Arc::clone(&self.backend), timeout);
        self.applier = Applier::new(Arc::clone(&self.backend), timeout);
        self
    }

    pub fn with_scaffolder(mut self, scaffolder: Arc<dyn Scaffolder>) -> Self {
        self.scaffolder = Some(scaffolder);
        self
    }

    pub fn catalog(&self) -> &'static TypeCatalog {
        self.backend.dialect().catalog()
    }

    pub fn reader(&self) -> &SchemaReader {
        &self.reader
    }

    pub fn locks(&self) -> &TableLocks {
        &self.locks
    }

    /// All tables, with whether each has a BREAD record.
    pub async fn tables(&self) -> Result<Vec<TableListing>> {
        self.reader.listing(self.store.as_ref()).await
    }

    pub async fn describe(&self, table: &str) -> Result<Table> {
        self.reader.describe_table(table).await
    }

    /// The plan `request` would produce right now. Takes no lock.
    pub async fn preview(&self, request: &TableRequest) -> Result<Plan> {
        match self.reader.describe_table(request.current_name()).await {
            Ok(current) => Ok(self.planner.plan(&current, request)?),
            Err(Error::TableNotFound(_)) => Ok(self.planner.plan_create(request)?),
            Err(e) => Err(e),
        }
    }

    /// Apply `request` to an in-memory copy of the table instead of the database.
    pub async fn dry_run(&self, request: &TableRequest) -> Result<(Plan, ApplyResult)> {
        let mut scratch = MemoryBackend::new(self.backend.dialect());
        if !self.backend.transactional_ddl() {
            scratch = scratch.non_transactional();
        }
        let plan = match self.reader.describe_table(request.current_name()).await {
            Ok(current) => {
                scratch.insert_table(&current);
                self.planner.plan(&current, request)?
            }
            Err(Error::TableNotFound(_)) => self.planner.plan_create(request)?,
            Err(e) => return Err(e),
        };
        let applier = Applier::new(Arc::new(scratch), self.timeout);
        let result = applier.apply(&plan, &CancelToken::new()).await;
        Ok((plan, result))
    }

    /// Create a table that doesn't exist yet.
    pub async fn create_table(&self, request: &TableRequest, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let _guard = self.locks.acquire([&request.name]).await;
        if self.reader.table_exists(&request.name).await? {
            return Err(Error::TableExists(request.name.clone()));
        }
        let plan = self.planner.plan_create(request)?;
        Ok(self.execute(plan, cancel, Some(&request.scaffold)).await)
    }

    /// Bring an existing table in line with `request`.
    pub async fn update_table(&self, request: &TableRequest, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let current_name = request.current_name();
        let _guard = self
            .locks
            .acquire([current_name, request.name.as_str()])
            .await;

        let current = self.reader.describe_table(current_name).await?;
        if current_name != request.name && self.reader.table_exists(&request.name).await? {
            return Err(Error::TableExists(request.name.clone()));
        }
        let plan = self.planner.plan(&current, request)?;
        Ok(self.execute(plan, cancel, Some(&request.scaffold)).await)
    }

    pub async fn drop_table(&self, table: &str, cancel: &CancelToken) -> Result<UpdateOutcome> {
        let _guard = self.locks.acquire([table]).await;
        if !self.reader.table_exists(table).await? {
            return Err(Error::TableNotFound(table.to_string()));
        }
        let plan = self.planner.plan_drop(table);
        Ok(self.execute(plan, cancel, None).await)
    }

    async fn execute(
        &self,
        plan: Plan,
        cancel: &CancelToken,
        scaffold: Option<&ScaffoldRequest>,
    ) -> UpdateOutcome {
        tracing::info!(table = %plan.table, operations = plan.len(), "applying plan");
        let result = self.applier.apply(&plan, cancel).await;

        let metadata = match &result {
            ApplyResult::Applied(applied) => self.sync_metadata(&plan, applied.table.as_ref()).await,
            ApplyResult::Failed(failure) => match failure.disposition {
                Disposition::PartiallyApplied | Disposition::Unknown => {
                    // Part of the plan may be live; sync against the table as it is now.
                    let mut done = Plan {
                        table: plan.table.clone(),
                        operations: failure.applied.clone(),
                    };
                    if done.renamed_from().is_none()
                        && let Some(old) = plan.renamed_from()
                    {
                        done.table = old.to_string();
                    }
                    let live = self.reader.describe_table(&done.table).await.ok();
                    self.sync_metadata(&done, live.as_ref()).await
                }
                Disposition::RolledBack | Disposition::NothingApplied => MetadataOutcome::Skipped,
            },
        };

        let mut scaffold_error = None;
        if let (ApplyResult::Applied(applied), Some(request), Some(scaffolder)) =
            (&result, scaffold, &self.scaffolder)
            && !request.is_empty()
            && let Some(table) = &applied.table
            && let Err(e) = scaffolder.scaffold(table, request).await
        {
            tracing::warn!(table = %table.name, error = %e, "scaffolding failed");
            scaffold_error = Some(e);
        }

        UpdateOutcome {
            plan,
            result,
            metadata,
            scaffold_error,
        }
    }

    async fn sync_metadata(&self, plan: &Plan, table: Option<&Table>) -> MetadataOutcome {
        match bounded("sync metadata", self.timeout, self.sync.sync(plan, table)).await {
            Ok(report) => MetadataOutcome::Synced(report),
            Err(e) => {
                tracing::warn!(table = %plan.table, error = %e, "metadata sync failed");
                MetadataOutcome::Failed(e.to_string())
            }
        }
    }

    /// A suggested BREAD record for an existing table.
    pub async fn prepopulate_bread(&self, table: &str) -> Result<BreadRecord> {
        let table = self.reader.describe_table(table).await?;
        Ok(self.sync.prepopulate(&table))
    }

    pub async fn bread(&self, table: &str) -> Result<Option<BreadRecord>> {
        bounded("load bread record", self.timeout, self.store.load(table)).await
    }

    /// Create or replace the BREAD record of an existing table.
    pub async fn save_bread(&self, record: BreadRecord) -> Result<BreadRecord> {
        let table = self.reader.describe_table(&record.table).await?;
        bounded("save bread record", self.timeout, self.sync.save(record, &table)).await
    }

    pub async fn delete_bread(&self, table: &str) -> Result<bool> {
        bounded("delete bread record", self.timeout, self.sync.delete(table)).await
    }

    /// Tables that have a BREAD record but no longer exist.
    pub async fn stale_bread(&self) -> Result<Vec<String>> {
        let live = self.reader.tables().await?;
        bounded("list bread records", self.timeout, self.sync.stale_records(&live)).await
    }
}
