//! PostgreSQL backing store for the Astral document service.
//!
//! Provides persistent storage for:
//!
//! - Users (`users`)
//! - Bearer tokens (`tokens`)
//! - Documents (`docs`)
//! - Per-document grants (`users_docs_grant`)
//!
//! [`PostgresStore`] implements [`astral_cache::BackingStore`]; every write
//! runs in its own transaction.
//!
//! # Example
//!
//! ```ignore
//! use astral_postgres::{PostgresConfig, PostgresStore};
//!
//! let store = PostgresStore::connect(&PostgresConfig::new("postgres://localhost/astral")).await?;
//! let user = store.users().find_by_login("alice").await?;
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod token;
pub mod user;

use async_trait::async_trait;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

use astral_cache::{
    BackingStore, Document, DocumentId, DocumentMap, IdentityMap, NewDocument, StoreResult, Token,
    User, UserId,
};

pub use config::PostgresConfig;
pub use document::DocumentStorage;
pub use error::{PostgresError, PostgresResult};
pub use token::TokenStorage;
pub use user::UserStorage;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// PostgreSQL Store
// =============================================================================

/// PostgreSQL implementation of the backing store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing pool. Migrations are not run.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and, if configured, apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> PostgresResult<Self> {
        let pool = pool::create_pool(config).await?;
        let store = Self::from_pool(pool);

        if config.run_migrations {
            store.migrate().await?;
        }

        Ok(store)
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> PostgresResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get user storage operations.
    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    /// Get token storage operations.
    #[must_use]
    pub fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }

    /// Get document storage operations.
    #[must_use]
    pub fn documents(&self) -> DocumentStorage<'_> {
        DocumentStorage::new(&self.pool)
    }
}

#[async_trait]
impl BackingStore for PostgresStore {
    async fn fetch_all_identities(&self) -> StoreResult<IdentityMap> {
        Ok(self.tokens().all_identities().await?)
    }

    async fn fetch_all_documents(&self) -> StoreResult<DocumentMap> {
        Ok(self.documents().all_documents().await?)
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<User> {
        Ok(self.users().create(login, password_hash).await?)
    }

    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_by_login(login).await?)
    }

    async fn create_token(&self, user_id: UserId) -> StoreResult<Token> {
        Ok(self.tokens().create(user_id).await?)
    }

    async fn delete_token(&self, token: &str) -> StoreResult<()> {
        Ok(self.tokens().delete(token).await?)
    }

    async fn create_document(&self, document: NewDocument) -> StoreResult<Document> {
        Ok(self.documents().create(document).await?)
    }

    async fn find_document(&self, id: DocumentId) -> StoreResult<Option<Document>> {
        Ok(self.documents().find_by_id(id).await?)
    }

    async fn delete_document(&self, id: DocumentId) -> StoreResult<()> {
        Ok(self.documents().delete(id).await?)
    }
}
