//! Schema introspection and table mutation for admin panels.
//!
//! An admin panel shows Browse/Read/Edit/Add/Delete ("BREAD") screens over
//! ordinary database tables and lets an operator change those tables. This
//! crate does the database side of that:
//!
//! - [`SchemaReader`] describes live tables in terms of the type catalog
//! - [`Planner`] turns a desired column set into an ordered [`Plan`]
//! - [`Applier`] runs a plan, reporting exactly how far it got on failure
//! - [`MetadataSynchronizer`] keeps BREAD records in line with the schema
//!
//! [`Engine`] ties them together behind per-table locks:
//!
//! ```ignore
//! let engine = Engine::new(Arc::new(PgBackend::connect(url)?), Arc::new(MemoryMetadataStore::new()));
//! let request = TableRequest::new("posts")
//!     .column(ColumnRequest::rename("title", "headline", "varchar"))
//!     .column(ColumnRequest::add("body", "text"));
//! let outcome = engine.update_table(&request, &CancelToken::new()).await?;
//! ```
//!
//! Database access goes through [`SchemaBackend`]; [`PgBackend`] talks to
//! Postgres and [`MemoryBackend`] keeps tables in memory for dry runs and tests.

mod applier;
mod backend;
mod engine;
mod error;
pub mod inflect;
mod lock;
mod memory;
pub mod meta;
mod planner;
mod postgres;
mod reader;
mod sync;
mod traced;

pub use applier::{
    AppliedPlan, Applier, ApplyFailure, ApplyResult, CancelToken, Disposition, FailedStep,
    FailureReason,
};
pub use backend::{BackendError, BoxFuture, DdlSession, NativeColumn, SchemaBackend};
pub use engine::{DEFAULT_TIMEOUT, Engine, MetadataOutcome, Scaffolder, UpdateOutcome};
pub use error::{Error, Result};
pub use lock::{TableLockGuard, TableLocks};
pub use memory::MemoryBackend;
pub use meta::{
    BreadRecord, FieldDefinition, MemoryMetadataStore, MetadataError, MetadataStore,
    PgMetadataStore,
};
pub use planner::{PlanError, Planner};
pub use postgres::PgBackend;
pub use reader::{SchemaReader, TableListing};
pub use sync::{MetadataSynchronizer, SyncReport};
pub use traced::{TracedObject, TracedPool};

pub use breadboard_schema::{
    CatalogListing, Column, ColumnAction, ColumnChange, ColumnDefault, ColumnRequest, Dialect,
    PayloadError, Plan, ScaffoldRequest, SchemaOperation, Table, TablePayload, TableRequest,
    TypeCatalog, TypeEntry, TypeLookup,
};
