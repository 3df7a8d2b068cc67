//! Error types for flitelog.
//!
//! This module defines all error types used throughout the flitelog crate.
//! Business-rule failures carry a stable [`ErrorKind`] so the API boundary
//! and the audit log can report machine-readable outcomes.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for flitelog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Business-rule failures (never retried) ===
    /// The requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: i64,
    },

    /// The acting party is not allowed to perform the operation.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why the actor was rejected.
        message: String,
    },

    /// The operation conflicts with the record's current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the state conflict.
        message: String,
    },

    /// An operator signature was attempted past the tier deadline.
    #[error("signing deadline exceeded for record {record_id}: {overdue_days} day(s) overdue")]
    DeadlineExceeded {
        /// The record whose deadline has passed.
        record_id: i64,
        /// Whole days past the deadline.
        overdue_days: i64,
    },

    /// A stored signature hash no longer matches the record content.
    #[error("integrity violation on record {record_id}: stored hash does not match content")]
    IntegrityViolation {
        /// The affected record.
        record_id: i64,
    },

    // === Retryable failures ===
    /// The external regulator system cannot be reached.
    #[error("regulator unavailable: {message}")]
    ExternalUnavailable {
        /// Transport-level failure description.
        message: String,
    },

    /// A retryable infrastructure fault.
    #[error("transient failure: {message}")]
    Transient {
        /// Description of the fault.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flitelog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// Stable machine-readable error categories.
///
/// These codes are written into audit entries and returned at the API
/// boundary; they must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity lookup failed.
    NotFound,
    /// Wrong actor for the operation.
    Forbidden,
    /// Invalid state transition.
    Conflict,
    /// Signing attempted past the tier deadline.
    DeadlineExceeded,
    /// Stored hash does not match record content.
    IntegrityViolation,
    /// External regulator unreachable.
    ExternalUnavailable,
    /// Retryable infrastructure fault.
    Transient,
    /// Operation exceeded its time limit.
    Timeout,
    /// Database open, query, or migration failure.
    Storage,
    /// Configuration load or validation failure.
    Config,
    /// File system failure.
    Io,
    /// JSON encode/decode failure.
    Serialization,
    /// Unexpected internal fault.
    Internal,
}

impl ErrorKind {
    /// The stable string code for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::IntegrityViolation => "integrity_violation",
            Self::ExternalUnavailable => "external_unavailable",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Io => "io",
            Self::Serialization => "serialization",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a not-found error for an entity.
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an external-unavailable error.
    #[must_use]
    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self::ExternalUnavailable {
            message: message.into(),
        }
    }

    /// Create a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The stable category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            Self::ExternalUnavailable { .. } => ErrorKind::ExternalUnavailable,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::DatabaseOpen { .. } | Self::DatabaseQuery(_) | Self::DatabaseMigration { .. } => {
                ErrorKind::Storage
            }
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => ErrorKind::Config,
            Self::Io(_) | Self::DirectoryCreate { .. } => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Serialization,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the scheduler/sync retry machinery may retry this error.
    ///
    /// Business-rule failures are never retryable; only infrastructure
    /// faults and regulator outages are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::ExternalUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// Check if this error is a state conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this error is a deadline rejection.
    #[must_use]
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Check if this error is an integrity violation.
    #[must_use]
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::IntegrityViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("flight record", 42);
        assert_eq!(err.to_string(), "flight record 42 not found");

        let err = Error::conflict("record already pilot signed");
        assert_eq!(err.to_string(), "conflict: record already pilot signed");
    }

    #[test]
    fn test_deadline_exceeded_display() {
        let err = Error::DeadlineExceeded {
            record_id: 7,
            overdue_days: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("record 7"));
        assert!(msg.contains("3 day(s)"));
    }

    #[test]
    fn test_kind_codes_are_stable() {
        assert_eq!(Error::not_found("record", 1).kind().as_str(), "not_found");
        assert_eq!(Error::forbidden("wrong actor").kind().as_str(), "forbidden");
        assert_eq!(Error::conflict("signed").kind().as_str(), "conflict");
        assert_eq!(
            Error::DeadlineExceeded {
                record_id: 1,
                overdue_days: 1
            }
            .kind()
            .as_str(),
            "deadline_exceeded"
        );
        assert_eq!(
            Error::IntegrityViolation { record_id: 1 }.kind().as_str(),
            "integrity_violation"
        );
        assert_eq!(
            Error::external_unavailable("down").kind().as_str(),
            "external_unavailable"
        );
        assert_eq!(Error::transient("busy").kind().as_str(), "transient");
        assert_eq!(Error::timeout("submit").kind().as_str(), "timeout");
        assert_eq!(Error::internal("bug").kind().as_str(), "internal");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::transient("db busy").is_retryable());
        assert!(Error::external_unavailable("down").is_retryable());
        assert!(Error::timeout("submit").is_retryable());

        assert!(!Error::not_found("record", 1).is_retryable());
        assert!(!Error::forbidden("wrong actor").is_retryable());
        assert!(!Error::conflict("already signed").is_retryable());
        assert!(!Error::DeadlineExceeded {
            record_id: 1,
            overdue_days: 1
        }
        .is_retryable());
        assert!(!Error::IntegrityViolation { record_id: 1 }.is_retryable());
    }

    #[test]
    fn test_predicates() {
        assert!(Error::conflict("x").is_conflict());
        assert!(!Error::forbidden("x").is_conflict());

        assert!(Error::DeadlineExceeded {
            record_id: 1,
            overdue_days: 2
        }
        .is_deadline_exceeded());
        assert!(!Error::conflict("x").is_deadline_exceeded());

        assert!(Error::IntegrityViolation { record_id: 1 }.is_integrity_violation());
        assert!(!Error::transient("x").is_integrity_violation());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
            assert_eq!(err.kind(), ErrorKind::Storage);
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
            assert_eq!(err.kind(), ErrorKind::Serialization);
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "retry budget must be at least 1".to_string(),
        };
        assert!(err.to_string().contains("retry budget"));
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::DeadlineExceeded.to_string(), "deadline_exceeded");
        assert_eq!(ErrorKind::Storage.to_string(), "storage");
    }
}
