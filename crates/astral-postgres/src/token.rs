//! Bearer token storage for PostgreSQL.

use astral_cache::{IdentityMap, ResolvedIdentity, Token, UserId, generate_token};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::PgPool;
use crate::error::{PostgresError, PostgresResult, is_foreign_key_violation};

// =============================================================================
// Token Storage
// =============================================================================

/// Token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load every token joined with its user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn all_identities(&self) -> PostgresResult<IdentityMap> {
        let rows: Vec<(i64, String, String, String)> = query_as(
            r#"
            SELECT u.id, u.login, u.password, t.token
            FROM users u
            JOIN tokens t ON u.id = t.user_id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, login, password_hash, token)| {
                (
                    token.clone(),
                    ResolvedIdentity {
                        user_id: UserId(user_id),
                        login,
                        password_hash,
                        token,
                    },
                )
            })
            .collect())
    }

    /// Issue a new token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub async fn create(&self, user_id: UserId) -> PostgresResult<Token> {
        let token = generate_token();
        let mut tx = self.pool.begin().await?;

        query("INSERT INTO tokens (user_id, token) VALUES ($1, $2)")
            .bind(user_id.0)
            .bind(&token)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return PostgresError::not_found(format!("user {user_id}"));
                }
                PostgresError::from(e)
            })?;

        tx.commit().await?;

        Ok(Token { user_id, token })
    }

    /// Delete a token.
    ///
    /// This operation is idempotent - deleting an unknown token succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, token: &str) -> PostgresResult<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM tokens WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
