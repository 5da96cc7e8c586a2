//! Errors of the mapper lifecycle.
//!
//! Correlating spans has no failure path: spans that cannot be resolved are
//! parked and eventually dropped. Only starting and stopping the mapper can
//! fail.
use opentelemetry_sdk::error::OTelSdkError;
use std::sync::PoisonError;
use thiserror::Error;

/// Errors returned by [`Mapper`](crate::Mapper) lifecycle operations.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum CorrelationError {
    /// The mapper was already shut down.
    #[error("mapper already shut down")]
    AlreadyShutdown,

    /// The background worker evicting expired spans could not be started or
    /// did not stop cleanly.
    #[error("pending spans cleanup worker failed: {0}")]
    CleanupWorker(String),

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<PoisonError<T>> for CorrelationError {
    fn from(err: PoisonError<T>) -> Self {
        CorrelationError::Poisoned(err.to_string())
    }
}

impl From<CorrelationError> for OTelSdkError {
    fn from(err: CorrelationError) -> Self {
        match err {
            CorrelationError::AlreadyShutdown => OTelSdkError::AlreadyShutdown,
            other => OTelSdkError::InternalFailure(other.to_string()),
        }
    }
}
