//! Error taxonomy for the sync engine.

use lexsync_model::ModelError;
use lexsync_remote::{BatchFailure, RemoteError};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the merge engine and orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend is reachable-in-principle but the probe failed on the
    /// network, so sync cannot start.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but the schema was never provisioned.
    #[error("backend not provisioned: relation {table} is missing")]
    NotProvisioned {
        /// The first relation found missing.
        table: String,
    },

    /// A remote operation failed mid-run.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A row could not be encoded or decoded at the model boundary.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A batched push halted part-way through a collection.
    #[error(transparent)]
    PushHalted(#[from] BatchFailure),

    /// The local document store failed to read or write.
    #[error("local store error: {0}")]
    Store(String),

    /// An attachment operation needed a blob that is not addressable.
    #[error("document {file_name} has no storage path")]
    DocumentUnavailable {
        /// Display name of the attachment.
        file_name: String,
    },
}

impl EngineError {
    /// Creates a local store error.
    pub fn store(message: impl Into<String>) -> Self {
        EngineError::Store(message.into())
    }

    /// True when simply re-running the sync may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Unavailable(_) => true,
            EngineError::Remote(e) => e.is_retryable(),
            EngineError::PushHalted(f) => f.source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_source() {
        assert!(EngineError::Unavailable("refused".into()).is_retryable());
        assert!(EngineError::Remote(RemoteError::Network("reset".into())).is_retryable());
        assert!(!EngineError::Remote(RemoteError::SessionExpired).is_retryable());
        assert!(!EngineError::NotProvisioned {
            table: "clients".into()
        }
        .is_retryable());
        assert!(!EngineError::store("disk full").is_retryable());
    }
}
