use crate::store::StoreError;
use crate::sync::SyncRequest;

/// Errors that end the cache sync service.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A category could not be reloaded from the backing store.
    ///
    /// The snapshot can no longer be kept fresh, so the service stops.
    #[error("failed to refresh {category}: {source}")]
    RefreshFailed {
        category: SyncRequest,
        #[source]
        source: StoreError,
    },

    /// `run` was called on a service that is already running or has finished.
    #[error("cache sync service is already running")]
    AlreadyRunning,
}

impl CacheError {
    /// Returns `true` if this is a refresh failure.
    #[must_use]
    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::RefreshFailed { .. })
    }
}

/// Result type for the cache sync service.
pub type CacheResult<T> = Result<T, CacheError>;
