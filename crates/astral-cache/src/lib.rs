//! Consistency cache for the Astral document service.
//!
//! Reads are served entirely from an in-memory [`CacheSnapshot`] of users,
//! tokens, documents and grants. Writes go to a [`BackingStore`] and then
//! signal the [`CacheSyncService`] through a [`SyncNotifier`]; the service
//! reloads the affected category wholesale. An idle timer reloads both
//! categories when no writes arrive.
//!
//! - [`types`] - users, tokens, documents and the snapshot maps
//! - [`store`] - the backing store trait and an in-memory implementation
//! - [`snapshot`] - the two independently locked maps
//! - [`sync`] - the background writer of the snapshot
//! - [`resolver`] - read-only queries used by request handlers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use astral_cache::{AccessResolver, CacheSnapshot, CacheSyncService, MemoryStore, SyncConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let snapshot = Arc::new(CacheSnapshot::new());
//! let (service, notifier) = CacheSyncService::new(store, snapshot.clone(), SyncConfig::default());
//! tokio::spawn(async move { service.run().await });
//!
//! let resolver = AccessResolver::new(snapshot);
//! let identity = resolver.resolve_token("...");
//! ```

pub mod credentials;
pub mod error;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod types;

pub use credentials::generate_token;
pub use error::{CacheError, CacheResult};
pub use resolver::AccessResolver;
pub use snapshot::{CacheSnapshot, SnapshotStats};
pub use store::{BackingStore, MemoryStore, StoreError, StoreResult};
pub use sync::{CacheSyncService, SyncConfig, SyncEpoch, SyncNotifier, SyncRequest, SyncStats};
pub use types::{
    Document, DocumentId, DocumentMap, IdentityMap, NewDocument, ResolvedIdentity, Token, User,
    UserId,
};
