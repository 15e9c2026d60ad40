use std::fmt;

use crate::lock::LockError;
use crate::model::validation::ValidationErrors;

/// Machine-readable error codes for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    MissingActor,
    NoAdminFunction,
    ValidationFailed,
    NotFound,
    Unauthorized,
    ReassignRejected,
    StorageFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::MissingActor => "E1003",
            Self::NoAdminFunction => "E1004",
            Self::ValidationFailed => "E2001",
            Self::NotFound => "E2002",
            Self::Unauthorized => "E2003",
            Self::ReassignRejected => "E2004",
            Self::StorageFailed => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::MissingActor => "No acting user attributed to project creation",
            Self::NoAdminFunction => "No admin-flagged function available",
            Self::ValidationFailed => "Project validation failed",
            Self::NotFound => "Record not found",
            Self::Unauthorized => "Not allowed",
            Self::ReassignRejected => "Function reassignment rejected",
            Self::StorageFailed => "Storage operation failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `mp init` to create the store."),
            Self::ConfigParseError => Some("Fix syntax in .milepost/config.toml and retry."),
            Self::MissingActor => Some("Pass the founding user when creating a project."),
            Self::NoAdminFunction => {
                Some("Flag at least one function as admin with `mp function set-admin`.")
            }
            Self::ValidationFailed | Self::NotFound => None,
            Self::Unauthorized => Some("Ask a project or global admin to perform this change."),
            Self::ReassignRejected => {
                Some("Keep at least one admin function in the assignment set.")
            }
            Self::StorageFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other `mp` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the project aggregate and its store.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// One or more save-time invariants failed; nothing was persisted.
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    /// A project was created without a founding user.
    #[error("project creation needs an acting user")]
    MissingActor,

    /// The registry holds no admin-flagged function to seed a founding member.
    #[error("no function is flagged as project admin")]
    NoAdminFunction,

    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// An access fact supplied by the caller denied the operation.
    #[error("not allowed: {0}")]
    Unauthorized(&'static str),

    /// Registry lock acquisition failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Derived JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProjectError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Invalid(_) => ErrorCode::ValidationFailed,
            Self::MissingActor => ErrorCode::MissingActor,
            Self::NoAdminFunction => ErrorCode::NoAdminFunction,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Lock(err) => err.code(),
            Self::Storage(_) => ErrorCode::StorageFailed,
            Self::Serialization(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Per-field validation errors, when this is a validation failure.
    #[must_use]
    pub const fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }

    pub(crate) const fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }
}

/// Result alias for aggregate and store operations.
pub type Result<T, E = ProjectError> = std::result::Result<T, E>;
