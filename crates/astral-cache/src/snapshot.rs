//! In-memory snapshot of identities and documents.
//!
//! The snapshot holds two independently locked maps:
//!
//! - identities, keyed by token value
//! - documents, keyed by filename
//!
//! Each map is held as an `Arc` and replaced wholesale. A refresh builds the
//! new map without holding any lock and then swaps the `Arc` under the
//! category's write lock, so readers never see a partially populated map
//! and the other category stays readable throughout. Listings clone the
//! `Arc` and iterate outside the lock.
//!
//! The snapshot performs no I/O. Only the sync service writes to it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Document, DocumentMap, IdentityMap, ResolvedIdentity};

// =============================================================================
// Category Slot
// =============================================================================

#[derive(Debug)]
struct Slot<M> {
    map: Arc<M>,
    version: u64,
}

impl<M: Default> Default for Slot<M> {
    fn default() -> Self {
        Self {
            map: Arc::new(M::default()),
            version: 0,
        }
    }
}

// =============================================================================
// Snapshot Statistics
// =============================================================================

/// Entry counts and versions of both categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotStats {
    pub identities: usize,
    pub documents: usize,
    pub identities_version: u64,
    pub documents_version: u64,
}

// =============================================================================
// Cache Snapshot
// =============================================================================

/// Read-only projection of the backing store used to serve queries.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    identities: RwLock<Slot<IdentityMap>>,
    documents: RwLock<Slot<DocumentMap>>,
}

impl CacheSnapshot {
    /// Create an empty snapshot. Both versions start at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Identities
    // -------------------------------------------------------------------------

    /// Look up the identity bound to `token`.
    #[must_use]
    pub fn identity(&self, token: &str) -> Option<ResolvedIdentity> {
        self.identities.read().map.get(token).cloned()
    }

    /// The whole identity map as of the last completed refresh.
    #[must_use]
    pub fn identities(&self) -> Arc<IdentityMap> {
        Arc::clone(&self.identities.read().map)
    }

    /// Replace the identity map and return the new version.
    pub fn replace_identities(&self, map: IdentityMap) -> u64 {
        let map = Arc::new(map);
        let mut slot = self.identities.write();
        slot.map = map;
        slot.version += 1;
        slot.version
    }

    /// Number of completed identity refreshes.
    #[must_use]
    pub fn identities_version(&self) -> u64 {
        self.identities.read().version
    }

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    /// Look up a document by filename.
    #[must_use]
    pub fn document(&self, filename: &str) -> Option<Document> {
        self.documents.read().map.get(filename).cloned()
    }

    /// The whole document map as of the last completed refresh.
    #[must_use]
    pub fn documents(&self) -> Arc<DocumentMap> {
        Arc::clone(&self.documents.read().map)
    }

    /// Replace the document map and return the new version.
    pub fn replace_documents(&self, map: DocumentMap) -> u64 {
        let map = Arc::new(map);
        let mut slot = self.documents.write();
        slot.map = map;
        slot.version += 1;
        slot.version
    }

    /// Number of completed document refreshes.
    #[must_use]
    pub fn documents_version(&self) -> u64 {
        self.documents.read().version
    }

    /// Entry counts and versions.
    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        let (identities, identities_version) = {
            let slot = self.identities.read();
            (slot.map.len(), slot.version)
        };
        let (documents, documents_version) = {
            let slot = self.documents.read();
            (slot.map.len(), slot.version)
        };

        SnapshotStats {
            identities,
            documents,
            identities_version,
            documents_version,
        }
    }
}
