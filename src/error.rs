//! Client error type
//!
//! Errors fall into four classes, reported by [`ClientError::kind`]:
//! - known request errors: constraint violations, missing records and
//!   transaction failures, each with a stable `P` code
//! - validation errors: arguments rejected before any SQL runs
//! - initialization errors: bad configuration or a failed connect
//! - unknown request errors: any other database failure

use sqlx::error::ErrorKind as DbErrorKind;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error class of a [`ClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    KnownRequest,
    UnknownRequest,
    Validation,
    Initialization,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unique constraint failed on {model}: ({})", .fields.join(", "))]
    UniqueConstraint {
        model: &'static str,
        fields: Vec<String>,
    },

    #[error("Foreign key constraint failed on {model}: {detail}")]
    ForeignKeyConstraint { model: &'static str, detail: String },

    #[error("Null constraint violation on {model}.{field}")]
    NullConstraint { model: &'static str, field: String },

    #[error("No {model} record was found for {operation}")]
    RecordNotFound {
        model: &'static str,
        operation: &'static str,
    },

    #[error("Unable to start a transaction within {max_wait_ms}ms")]
    TransactionStartTimeout { max_wait_ms: u64 },

    #[error("Transaction expired after {timeout_ms}ms and was rolled back")]
    TransactionExpired { timeout_ms: u64 },

    #[error("Transaction already closed")]
    TransactionClosed,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ClientError {
    /// Map a sqlx error raised while operating on `model`.
    ///
    /// Constraint violations become known request errors; everything else is
    /// kept as `Database`.
    pub fn from_sqlx(err: sqlx::Error, model: &'static str) -> Self {
        let sqlx::Error::Database(db) = &err else {
            return Self::Database(err);
        };
        let message = db.message();

        match db.kind() {
            DbErrorKind::UniqueViolation => Self::UniqueConstraint {
                model,
                fields: constraint_columns(message, "UNIQUE constraint failed:"),
            },
            DbErrorKind::ForeignKeyViolation => Self::ForeignKeyConstraint {
                model,
                detail: message.to_string(),
            },
            DbErrorKind::NotNullViolation => Self::NullConstraint {
                model,
                field: constraint_columns(message, "NOT NULL constraint failed:")
                    .into_iter()
                    .next()
                    .unwrap_or_default(),
            },
            _ => Self::Database(err),
        }
    }

    /// Error class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UniqueConstraint { .. }
            | Self::ForeignKeyConstraint { .. }
            | Self::NullConstraint { .. }
            | Self::RecordNotFound { .. }
            | Self::TransactionStartTimeout { .. }
            | Self::TransactionExpired { .. }
            | Self::TransactionClosed => ErrorKind::KnownRequest,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::Database(_) => ErrorKind::UnknownRequest,
        }
    }

    /// Stable code of a known request error
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::UniqueConstraint { .. } => Some("P2002"),
            Self::ForeignKeyConstraint { .. } => Some("P2003"),
            Self::NullConstraint { .. } => Some("P2011"),
            Self::TransactionStartTimeout { .. } => Some("P2024"),
            Self::RecordNotFound { .. } => Some("P2025"),
            Self::TransactionExpired { .. } | Self::TransactionClosed => Some("P2028"),
            _ => None,
        }
    }

    /// Check if this error might go away on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransactionStartTimeout { .. } => true,
            Self::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// Whether this is a `RecordNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}

/// Column names from messages like `UNIQUE constraint failed: user.email, user.name`
fn constraint_columns(message: &str, prefix: &str) -> Vec<String> {
    let Some(rest) = message.find(prefix).map(|i| &message[i + prefix.len()..]) else {
        return Vec::new();
    };
    rest.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.rsplit_once('.') {
            Some((_, column)) => column.to_string(),
            None => part.to_string(),
        })
        .collect()
}
