use chrono::{DateTime, Utc};
use mediadex_model::SessionId;
use thiserror::Error;

/// Failures reported by a [`ContentStore`](crate::store::ContentStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {path} returned status {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid listing for {path}: {reason}")]
    InvalidListing { path: String, reason: String },

    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

impl StoreError {
    /// Network and server-side failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            StoreError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            StoreError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            StoreError::NotFound(_)
            | StoreError::InvalidListing { .. }
            | StoreError::InvalidPath(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "Scan lease is held by session {session_id} (last heartbeat {last_heartbeat_at})"
    )]
    LeaseConflict {
        session_id: SessionId,
        last_heartbeat_at: DateTime<Utc>,
    },

    #[error("A scan is already running in this session")]
    AlreadyRunning,

    #[error("No scan is running in this session")]
    NotRunning,

    #[error("Scan lease was lost (current holder: {holder:?})")]
    LeaseLost { holder: Option<SessionId> },

    #[error("State file {file} has unsupported schema version {version}")]
    UnsupportedStateVersion { file: String, version: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Store(err) if err.is_transient())
    }

    /// Coordination conflicts: surfaced to the caller, never retried.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ScanError::LeaseConflict { .. } | ScanError::AlreadyRunning
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = StoreError::Status {
            method: "GET",
            path: "/a".into(),
            status: 503,
        };
        assert!(err.is_transient());
        assert!(ScanError::from(err).is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = StoreError::Status {
            method: "PUT",
            path: "/a".into(),
            status: 403,
        };
        assert!(!err.is_transient());
        assert!(!StoreError::NotFound("/a".into()).is_transient());
    }

    #[test]
    fn conflicts_are_classified() {
        assert!(ScanError::AlreadyRunning.is_conflict());
        assert!(!ScanError::NotRunning.is_conflict());
    }
}
