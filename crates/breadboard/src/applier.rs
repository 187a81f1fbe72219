//! Executes a [`Plan`] against a backend.
//!
//! Operations run in plan order and the first failure stops the run. The
//! result always says exactly which operations ran, which one failed, which
//! never ran, and whether the database kept the prefix.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use breadboard_schema::{Plan, SchemaOperation, Table};
use tracing::Instrument;

use crate::backend::{DdlSession, SchemaBackend};
use crate::error::Error;
use crate::reader::SchemaReader;

/// Cooperative cancellation, checked between operations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedStep {
    /// Opening the DDL session (connection, transaction, advisory locks)
    Begin,
    /// For a cancellation, the operation that would have run next.
    Operation(SchemaOperation),
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Database(String),
    Timeout(Duration),
    Cancelled,
}

/// What the database holds after a failed apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The applied prefix was rolled back.
    RolledBack,
    /// The applied prefix is live (no transactional DDL).
    PartiallyApplied,
    /// Nothing had run yet.
    NothingApplied,
    /// The commit didn't answer in time; the prefix may or may not be live.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub applied: Vec<SchemaOperation>,
    pub failed_at: FailedStep,
    pub pending: Vec<SchemaOperation>,
    pub reason: FailureReason,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPlan {
    pub operations: Vec<SchemaOperation>,
    /// The table as re-read after commit; `None` when the plan dropped it.
    pub table: Option<Table>,
    /// Set when the apply succeeded but the re-read didn't.
    pub reread_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    Applied(AppliedPlan),
    Failed(ApplyFailure),
}

impl ApplyResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied(_))
    }

    pub fn failure(&self) -> Option<&ApplyFailure> {
        match self {
            ApplyResult::Failed(f) => Some(f),
            ApplyResult::Applied(_) => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Database(msg) => f.write_str(msg),
            FailureReason::Timeout(after) => write!(f, "timed out after {after:?}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::RolledBack => "rolled back",
            Disposition::PartiallyApplied => "partially applied",
            Disposition::NothingApplied => "nothing applied",
            Disposition::Unknown => "outcome unknown",
        })
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failed_at {
            FailedStep::Begin => write!(f, "begin failed: {}", self.reason)?,
            FailedStep::Operation(op) => write!(f, "{op}: {}", self.reason)?,
            FailedStep::Commit => write!(f, "commit failed: {}", self.reason)?,
        }
        write!(
            f,
            " ({}; {} applied, {} pending)",
            self.disposition,
            self.applied.len(),
            self.pending.len()
        )
    }
}

fn reason_of(err: Error) -> FailureReason {
    match err {
        Error::Timeout { after, .. } => FailureReason::Timeout(after),
        other => FailureReason::Database(other.to_string()),
    }
}

pub struct Applier {
    backend: Arc<dyn SchemaBackend>,
    reader: SchemaReader,
    timeout: Duration,
}

impl Applier {
    pub fn new(backend: Arc<dyn SchemaBackend>, timeout: Duration) -> Self {
        let reader = SchemaReader::new(Arc::clone(&backend), timeout);
        Self {
            backend,
            reader,
            timeout,
        }
    }

    /// Apply `plan`. Never retries.
    pub async fn apply(&self, plan: &Plan, cancel: &CancelToken) -> ApplyResult {
        let span = tracing::info_span!("apply", table = %plan.table, operations = plan.len());
        async {
            if plan.is_empty() {
                tracing::debug!("empty plan");
                return self.applied(plan).await;
            }

            let lock_tables = plan.touched_tables();
            let session = match crate::error::bounded(
                "begin",
                self.timeout,
                self.backend.begin(&lock_tables),
            )
            .await
            {
                Ok(s) => s,
                Err(e) => {
                    let failure = ApplyFailure {
                        applied: Vec::new(),
                        failed_at: FailedStep::Begin,
                        pending: plan.operations.clone(),
                        reason: reason_of(e),
                        disposition: Disposition::NothingApplied,
                    };
                    tracing::warn!(%failure, "apply failed");
                    return ApplyResult::Failed(failure);
                }
            };

            match self.run(plan, session, cancel).await {
                Ok(()) => self.applied(plan).await,
                Err(failure) => {
                    tracing::warn!(%failure, "apply failed");
                    ApplyResult::Failed(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        plan: &Plan,
        mut session: Box<dyn DdlSession>,
        cancel: &CancelToken,
    ) -> Result<(), ApplyFailure> {
        let ops = &plan.operations;
        for (i, op) in ops.iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                Err(FailureReason::Cancelled)
            } else {
                crate::error::bounded("apply operation", self.timeout, session.apply(op))
                    .await
                    .map_err(reason_of)
            };
            match outcome {
                Ok(()) => tracing::info!(step = i + 1, %op, "applied"),
                Err(reason) => {
                    let disposition = self.abandon(session, i).await;
                    return Err(ApplyFailure {
                        applied: ops[..i].to_vec(),
                        failed_at: FailedStep::Operation(op.clone()),
                        pending: ops[i + 1..].to_vec(),
                        reason,
                        disposition,
                    });
                }
            }
        }

        match crate::error::bounded("commit", self.timeout, session.commit()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let reason = reason_of(e);
                let disposition = match (&reason, self.backend.transactional_ddl()) {
                    (_, false) => Disposition::PartiallyApplied,
                    (FailureReason::Timeout(_), true) => Disposition::Unknown,
                    (_, true) => Disposition::RolledBack,
                };
                Err(ApplyFailure {
                    applied: ops.clone(),
                    failed_at: FailedStep::Commit,
                    pending: Vec::new(),
                    reason,
                    disposition,
                })
            }
        }
    }

    /// Roll back after a failure at operation index `failed`.
    async fn abandon(&self, session: Box<dyn DdlSession>, failed: usize) -> Disposition {
        if let Err(e) = crate::error::bounded("rollback", self.timeout, session.rollback()).await {
            // A dropped session discards its transaction anyway.
            tracing::warn!(error = %e, "rollback failed");
        }
        if failed == 0 {
            Disposition::NothingApplied
        } else if self.backend.transactional_ddl() {
            Disposition::RolledBack
        } else {
            Disposition::PartiallyApplied
        }
    }

    async fn applied(&self, plan: &Plan) -> ApplyResult {
        let (table, reread_error) = if plan.drops_table() {
            (None, None)
        } else {
            match self.reader.describe_table(&plan.table).await {
                Ok(t) => (Some(t), None),
                Err(e) => {
                    tracing::warn!(error = %e, "re-read after apply failed");
                    (None, Some(e.to_string()))
                }
            }
        };
        ApplyResult::Applied(AppliedPlan {
            operations: plan.operations.clone(),
            table,
            reread_error,
        })
    }
}
