//! Error taxonomy for remote operations.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote access layer.
///
/// Backend responses are folded into this taxonomy by
/// [`classify_response`]; callers never see raw status codes.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The backend is unreachable or not set up at all.
    #[error("backend unreachable: {0}")]
    Unconfigured(String),

    /// An expected relation is missing: the schema was never provisioned.
    #[error("relation missing: {table} (backend schema not provisioned)")]
    RelationMissing {
        /// The relation that does not exist.
        table: String,
    },

    /// Row-level policy rejected the operation for this account.
    #[error("authorization denied on {table}: this account lacks write rights; ask the owner to grant access")]
    AuthorizationDenied {
        /// The relation the write was rejected on.
        table: String,
    },

    /// The auth session is invalid or expired and could not be refreshed.
    #[error("session expired; re-authentication required")]
    SessionExpired,

    /// A remote call exceeded its explicit timeout.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that was applied.
        seconds: u64,
    },

    /// A transport-level failure (connection refused, reset, DNS...).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a body that could not be decoded.
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// Anything the classifier could not place.
    #[error("unexpected backend error (status {status}): {message}")]
    Unknown {
        /// HTTP status code.
        status: u16,
        /// Response body or summary.
        message: String,
    },
}

impl RemoteError {
    /// True when re-invoking the whole sync may succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout { .. } | RemoteError::Network(_)
        )
    }
}

/// Classifies a non-success backend response.
///
/// Follows Postgres/PostgREST conventions: `42P01` is an undefined
/// relation, `42501` is insufficient privilege (row-level policy),
/// `PGRST301` is an expired JWT.
pub fn classify_response(status: u16, body: &str, table: &str) -> RemoteError {
    if body.contains("42P01") {
        return RemoteError::RelationMissing {
            table: table.to_string(),
        };
    }
    if status == 401 || body.contains("PGRST301") || body.contains("JWT expired") {
        return RemoteError::SessionExpired;
    }
    if status == 403 || body.contains("42501") {
        return RemoteError::AuthorizationDenied {
            table: table.to_string(),
        };
    }
    if status == 404 {
        return RemoteError::RelationMissing {
            table: table.to_string(),
        };
    }
    RemoteError::Unknown {
        status,
        message: body.chars().take(512).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::Network("reset".into()).is_retryable());
        assert!(RemoteError::Timeout {
            operation: "select clients".into(),
            seconds: 30,
        }
        .is_retryable());
        assert!(!RemoteError::SessionExpired.is_retryable());
        assert!(!RemoteError::AuthorizationDenied {
            table: "clients".into()
        }
        .is_retryable());
    }

    #[test]
    fn classify_missing_relation() {
        let err = classify_response(400, r#"{"code":"42P01","message":"relation does not exist"}"#, "clients");
        assert!(matches!(err, RemoteError::RelationMissing { table } if table == "clients"));

        let err = classify_response(404, "not found", "clients");
        assert!(matches!(err, RemoteError::RelationMissing { .. }));
    }

    #[test]
    fn classify_session_expired() {
        assert!(matches!(
            classify_response(401, "", "clients"),
            RemoteError::SessionExpired
        ));
        assert!(matches!(
            classify_response(400, r#"{"code":"PGRST301"}"#, "clients"),
            RemoteError::SessionExpired
        ));
    }

    #[test]
    fn classify_authorization_denied() {
        assert!(matches!(
            classify_response(403, "", "cases"),
            RemoteError::AuthorizationDenied { table } if table == "cases"
        ));
        assert!(matches!(
            classify_response(400, r#"{"code":"42501"}"#, "cases"),
            RemoteError::AuthorizationDenied { .. }
        ));
    }

    #[test]
    fn classify_unknown_keeps_status() {
        let err = classify_response(500, "boom", "clients");
        assert!(matches!(err, RemoteError::Unknown { status: 500, .. }));
    }
}
