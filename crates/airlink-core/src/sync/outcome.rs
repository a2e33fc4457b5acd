//! Terminal results of a sync call

use std::fmt;

use thiserror::Error;

/// Where a successful payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Verified earlier and still within the cache TTL
    Cache,
    /// Freshly fetched and verified
    Remote,
    /// Remote was unusable; this is what the local store held
    LocalFallback,
}

impl DataSource {
    pub fn is_stale(&self) -> bool {
        matches!(self, DataSource::LocalFallback)
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Cache => write!(f, "cache"),
            DataSource::Remote => write!(f, "remote"),
            DataSource::LocalFallback => write!(f, "local fallback"),
        }
    }
}

/// Why the remote payload was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    /// Signature missing or invalid
    Rejected,
    /// Transport error, timeout, or unparseable body
    NetworkFailed,
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::Rejected => write!(f, "signature rejected"),
            FallbackCause::NetworkFailed => write!(f, "network failed"),
        }
    }
}

/// A sync call that produced no payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    #[error("{0}, and no local data to fall back on")]
    NoLocalData(FallbackCause),

    #[error("local store failed: {0}")]
    Store(String),
}

/// Outcome of one sync invocation. Always terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T> {
    Success { payload: Vec<T>, source: DataSource },
    Failure(SyncFailure),
}

impl<T> SyncOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&[T]> {
        match self {
            SyncOutcome::Success { payload, .. } => Some(payload),
            SyncOutcome::Failure(_) => None,
        }
    }

    pub fn source(&self) -> Option<DataSource> {
        match self {
            SyncOutcome::Success { source, .. } => Some(*source),
            SyncOutcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Vec<T>, SyncFailure> {
        match self {
            SyncOutcome::Success { payload, .. } => Ok(payload),
            SyncOutcome::Failure(failure) => Err(failure),
        }
    }
}
