use std::sync::Arc;

use astral_api::ApiError;
use astral_cache::{AccessResolver, BackingStore, ResolvedIdentity, SyncNotifier};
use axum::http::{HeaderMap, header::AUTHORIZATION};

use crate::auth::Authenticator;
use crate::blob::BlobStorage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BackingStore>,
    pub resolver: AccessResolver,
    pub notifier: SyncNotifier,
    pub blobs: BlobStorage,
    pub authenticator: Authenticator,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BackingStore>,
        resolver: AccessResolver,
        notifier: SyncNotifier,
        blobs: BlobStorage,
        root_token: impl Into<String>,
    ) -> Self {
        let authenticator =
            Authenticator::new(store.clone(), resolver.clone(), notifier.clone(), root_token);
        Self {
            store,
            resolver,
            notifier,
            blobs,
            authenticator,
        }
    }

    /// Resolve a caller's token against the identity cache.
    pub fn identity(&self, token: &str) -> Result<ResolvedIdentity, ApiError> {
        self.resolver
            .resolve_token(token)
            .ok_or_else(|| ApiError::forbidden(format!("Token {token} doesn't exist. ")))
    }
}

/// Pick the caller's token: an explicit value wins, then `Authorization: Bearer`.
pub fn caller_token(explicit: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return token.to_string();
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}
