use astral_api::ApiError;
use astral_cache::StoreError;

/// Map a backing store failure onto an HTTP error.
///
/// Callers that give `Conflict` a route-specific meaning match on it first.
pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(msg) => ApiError::not_found(msg),
        StoreError::Conflict(msg) => ApiError::conflict(msg),
        StoreError::InvalidInput(msg) => ApiError::bad_request(msg),
        StoreError::Database(msg) | StoreError::Unavailable(msg) => ApiError::internal(msg),
    }
}
