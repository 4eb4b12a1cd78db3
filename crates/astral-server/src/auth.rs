//! Registration, login and logout.
//!
//! Writes go straight to the backing store; token lookups go through the
//! cache. A login issues a new token only when the cache knows none for the
//! user, so two logins racing ahead of an identity refresh can both create
//! one. Every token stays valid until it is logged out.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use astral_api::ApiError;
use astral_cache::{AccessResolver, BackingStore, StoreError, SyncNotifier, SyncRequest, User};
use thiserror::Error;

use crate::error::store_error;

pub const MIN_PASSWORD_LEN: usize = 8;

const WEAK_PASSWORD_MESSAGE: &str = "Password must contain: minimum length 8, digits, at least 2 letters in different cases, at least 1 character (not a letter or a number)";

// =============================================================================
// Password Policy and Hashing
// =============================================================================

/// Check the password policy: at least eight characters including an
/// uppercase letter, a lowercase letter, a digit and a punctuation or
/// symbol character.
pub fn is_password_valid(password: &str) -> bool {
    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_number = false;
    let mut has_special = false;

    for c in password.chars() {
        if c.is_uppercase() {
            has_upper = true;
        } else if c.is_lowercase() {
            has_lower = true;
        } else if c.is_numeric() {
            has_number = true;
        } else if !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control() {
            has_special = true;
        }
    }

    password.chars().count() >= MIN_PASSWORD_LEN
        && has_upper
        && has_lower
        && has_number
        && has_special
}

/// Hash a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash. Malformed hashes are errors.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect root token")]
    IncorrectRootToken,

    #[error("{}", WEAK_PASSWORD_MESSAGE)]
    WeakPassword,

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Failed to process password: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::IncorrectRootToken | AuthError::WeakPassword => {
                ApiError::bad_request(err.to_string())
            }
            AuthError::UserNotFound(_) => ApiError::not_found(err.to_string()),
            AuthError::InvalidPassword => ApiError::forbidden(err.to_string()),
            AuthError::Hashing(msg) => ApiError::internal(msg),
            AuthError::Store(e) => store_error(e),
        }
    }
}

// =============================================================================
// Authenticator
// =============================================================================

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn BackingStore>,
    resolver: AccessResolver,
    notifier: SyncNotifier,
    root_token: String,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn BackingStore>,
        resolver: AccessResolver,
        notifier: SyncNotifier,
        root_token: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
            root_token: root_token.into(),
        }
    }

    /// Create a user. Users without tokens are not cached, so nothing is
    /// refreshed.
    pub async fn register(
        &self,
        root_token: &str,
        login: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        if root_token != self.root_token {
            return Err(AuthError::IncorrectRootToken);
        }
        if !is_password_valid(password) {
            return Err(AuthError::WeakPassword);
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        let user = self.store.create_user(login, &password_hash).await?;
        tracing::info!(user_id = %user.id, login = %user.login, "user registered");
        Ok(user)
    }

    /// Return the user's cached token, or issue a new one.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<String, AuthError> {
        let user = self
            .store
            .find_user_by_login(login)
            .await?
            .ok_or_else(|| AuthError::UserNotFound(login.to_string()))?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        if !matches {
            return Err(AuthError::InvalidPassword);
        }

        if let Some(identity) = self.resolver.resolve_user_by_user_id(user.id) {
            return Ok(identity.token);
        }

        let token = self.store.create_token(user.id).await?;
        self.notifier.notify(SyncRequest::RefreshIdentities);
        tracing::info!(user_id = %user.id, "token issued");
        Ok(token.token)
    }

    /// Revoke a token. Revoking an unknown token succeeds.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete_token(token).await?;
        self.notifier.notify(SyncRequest::RefreshIdentities);
        Ok(())
    }
}
