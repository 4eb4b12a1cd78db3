//! Error types for the PostgreSQL backing store.

use astral_cache::StoreError;
use sqlx_core::error::Error as SqlxError;

/// Errors specific to the PostgreSQL backing store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Referenced row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input rejected before reaching the database.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PostgresError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Returns `true` if the error is a unique constraint violation.
pub fn is_unique_violation(err: &SqlxError) -> bool {
    matches!(err, SqlxError::Database(db_err) if db_err.is_unique_violation())
}

/// Returns `true` if the error is a foreign key violation.
pub fn is_foreign_key_violation(err: &SqlxError) -> bool {
    matches!(err, SqlxError::Database(db_err) if db_err.is_foreign_key_violation())
}

/// Returns `true` if the database could not be reached at all.
fn is_connection_failure(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::Io(_) | SqlxError::Tls(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed
    )
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) if is_connection_failure(&e) => {
                StoreError::unavailable(e.to_string())
            }
            PostgresError::Database(e) => StoreError::database(e.to_string()),
            PostgresError::Migration(message) => {
                StoreError::database(format!("Migration error: {message}"))
            }
            PostgresError::NotFound(message) => StoreError::not_found(message),
            PostgresError::Conflict(message) => StoreError::conflict(message),
            PostgresError::InvalidInput(message) => StoreError::invalid_input(message),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type PostgresResult<T> = Result<T, PostgresError>;
