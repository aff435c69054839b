use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the pool, the capability interface and the repositories.
///
/// Startup failures (`ConfigError`, `ConnectionError`, `StartupTimeout`) are fatal to the
/// caller that opened the store. Everything else is an operational error returned to the
/// immediate caller without retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] bb8::RunError<tokio_postgres::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("startup verification did not complete within {0:?}")]
    StartupTimeout(Duration),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("query returned no rows")]
    NoRows,

    /// The store accepted the statement but it changed nothing.
    #[error("no rows affected")]
    NoRowsAffected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("connection pool is closed")]
    PoolClosed,

    /// A repository error carrying the name of the operation that produced it.
    #[error("{op}: {source}")]
    Operation {
        op: &'static str,
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Wrap this error with the name of the operation that failed.
    #[must_use]
    pub fn within(self, op: &'static str) -> Self {
        StoreError::Operation {
            op,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any operation context.
    #[must_use]
    pub fn root(&self) -> &StoreError {
        match self {
            StoreError::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the call was abandoned because its context was cancelled or expired.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.root(),
            StoreError::Cancelled | StoreError::DeadlineExceeded
        )
    }

    /// True for errors that must stop the process during startup.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            StoreError::ConfigError(_)
                | StoreError::ConnectionError(_)
                | StoreError::StartupTimeout(_)
        )
    }
}
