//! Backing store abstraction.
//!
//! The backing store owns the durable truth for users, tokens, documents
//! and grant edges. The cache reads whole categories from it through
//! [`BackingStore::fetch_all_identities`] and
//! [`BackingStore::fetch_all_documents`]; request handlers perform writes
//! through the remaining methods and then notify the sync service.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::types::{Document, DocumentId, DocumentMap, IdentityMap, NewDocument, Token, User, UserId};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during backing store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store cannot be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `Database` error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

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

    /// Create an `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is an invalid input error.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns `true` if the caller supplied bad data (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidInput(_)
        )
    }
}

/// Result type for backing store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Backing Store Trait
// =============================================================================

/// Durable store behind the cache.
///
/// Every write runs in its own transaction and either succeeds or fails
/// atomically. Writes do not touch the cache; callers notify the sync
/// service after a successful write.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Load every live token joined with its user, keyed by token value.
    async fn fetch_all_identities(&self) -> StoreResult<IdentityMap>;

    /// Load every document with its grant list, keyed by filename.
    async fn fetch_all_documents(&self) -> StoreResult<DocumentMap>;

    /// Create a user.
    ///
    /// # Errors
    ///
    /// `Conflict` if the login is taken, `InvalidInput` if it is empty.
    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<User>;

    /// Find a user by login.
    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>>;

    /// Issue a fresh token for an existing user.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist.
    async fn create_token(&self, user_id: UserId) -> StoreResult<Token>;

    /// Delete a token. Deleting an unknown token succeeds.
    async fn delete_token(&self, token: &str) -> StoreResult<()>;

    /// Create a document and its grant edges.
    ///
    /// # Errors
    ///
    /// `Conflict` if the filename is taken, `InvalidInput` if it is empty.
    async fn create_document(&self, document: NewDocument) -> StoreResult<Document>;

    /// Read one document with its grant list.
    ///
    /// Unlike the cache, this reflects every committed write.
    async fn find_document(&self, id: DocumentId) -> StoreResult<Option<Document>>;

    /// Delete a document together with its grant edges. Deleting an unknown
    /// document succeeds.
    async fn delete_document(&self, id: DocumentId) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(StoreError::not_found("user 1").is_client_error());
        assert!(StoreError::conflict("login taken").is_client_error());
        assert!(StoreError::invalid_input("empty").is_client_error());
        assert!(!StoreError::database("boom").is_client_error());
        assert!(!StoreError::unavailable("down").is_client_error());
    }

    #[test]
    fn display_includes_context() {
        let err = StoreError::conflict("filename report.pdf already exists");
        assert_eq!(err.to_string(), "Conflict: filename report.pdf already exists");
    }
}
