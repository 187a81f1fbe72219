use std::time::Duration;

use thiserror::Error;

use crate::{BackendError, MetadataError, PlanError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("metadata store: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Run `fut`, failing with [`Error::Timeout`] once `after` has passed.
pub(crate) async fn bounded<T, E>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    Error: From<E>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res.map_err(Error::from),
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
