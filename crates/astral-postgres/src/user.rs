//! User storage for PostgreSQL.

use astral_cache::{User, UserId};
use sqlx_core::query_as::query_as;

use crate::PgPool;
use crate::error::{PostgresError, PostgresResult, is_unique_violation};

type UserRow = (i64, String, String);

fn user_from_row((id, login, password_hash): UserRow) -> User {
    User {
        id: UserId(id),
        login,
        password_hash,
    }
}

// =============================================================================
// User Storage
// =============================================================================

/// User storage operations.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    /// Create a new user storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the login is taken and `InvalidInput` if it is
    /// empty.
    pub async fn create(&self, login: &str, password_hash: &str) -> PostgresResult<User> {
        if login.is_empty() {
            return Err(PostgresError::invalid_input("login must not be empty"));
        }

        let mut tx = self.pool.begin().await?;

        let row: UserRow = query_as(
            r#"
            INSERT INTO users (login, password)
            VALUES ($1, $2)
            RETURNING id, login, password
            "#,
        )
        .bind(login)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return PostgresError::conflict(format!("user {login} already exists"));
            }
            PostgresError::from(e)
        })?;

        tx.commit().await?;

        Ok(user_from_row(row))
    }

    /// Find a user by login.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_login(&self, login: &str) -> PostgresResult<Option<User>> {
        let row: Option<UserRow> = query_as(
            r#"
            SELECT id, login, password
            FROM users
            WHERE login = $1
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }
}
