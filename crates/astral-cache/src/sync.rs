//! Background synchronisation of the cache snapshot.
//!
//! # Architecture
//!
//! - [`SyncRequest`] - the category of data a write has changed
//! - [`SyncNotifier`] - cloneable, non-blocking handle request handlers use to
//!   report changes
//! - [`CacheSyncService`] - the single writer of the [`CacheSnapshot`]
//!
//! The service refreshes both categories on startup, then waits for
//! notifications. A notification reloads its category in full. Requests that
//! are already queued when the service wakes up are coalesced, so a burst of
//! writes to one category costs one reload. When a whole idle interval passes
//! without any notification both categories are reloaded; the interval
//! restarts after every refresh pass.
//!
//! A failed reload stops the service with [`CacheError::RefreshFailed`].
//! There is no retry: the process is expected to exit rather than keep
//! serving a snapshot it can no longer refresh.
//!
//! # Example
//!
//! ```ignore
//! let (service, notifier) = CacheSyncService::new(store, snapshot, SyncConfig::default());
//! let service = Arc::new(service);
//!
//! let handle = tokio::spawn({
//!     let service = service.clone();
//!     async move { service.run().await }
//! });
//!
//! // After a successful write:
//! notifier.notify(SyncRequest::RefreshDocuments);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{CacheError, CacheResult};
use crate::snapshot::CacheSnapshot;
use crate::store::BackingStore;

/// Default idle interval before an unconditional refresh of both categories.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// Sync Requests
// =============================================================================

/// Category of cached data to reload.
///
/// Ordering puts identities first; coalesced requests are served in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncRequest {
    /// Users or tokens changed.
    RefreshIdentities,
    /// Documents or grants changed.
    RefreshDocuments,
}

impl SyncRequest {
    /// Both categories, in refresh order.
    pub const ALL: [SyncRequest; 2] = [SyncRequest::RefreshIdentities, SyncRequest::RefreshDocuments];

    /// Short category name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshIdentities => "identities",
            Self::RefreshDocuments => "documents",
        }
    }
}

impl fmt::Display for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sync Notifier
// =============================================================================

/// Handle for reporting changes to the sync service.
///
/// Sending never blocks and never fails from the caller's point of view; the
/// refresh it triggers happens asynchronously.
#[derive(Debug, Clone)]
pub struct SyncNotifier {
    sender: mpsc::UnboundedSender<SyncRequest>,
}

impl SyncNotifier {
    /// Ask for `request`'s category to be reloaded.
    pub fn notify(&self, request: SyncRequest) {
        if self.sender.send(request).is_err() {
            tracing::debug!(category = %request, "Cache sync service stopped, notification dropped");
        } else {
            tracing::debug!(category = %request, "Cache refresh requested");
        }
    }

    /// Returns `true` once the sync service has stopped listening.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cache sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time without notifications after which both categories are reloaded.
    ///
    /// Must be non-zero.
    pub idle_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

impl SyncConfig {
    /// Create a configuration with the given idle interval.
    #[must_use]
    pub fn with_idle_interval(idle_interval: Duration) -> Self {
        Self { idle_interval }
    }
}

// =============================================================================
// Epochs and Statistics
// =============================================================================

/// Snapshot versions after the most recent refresh of each category.
///
/// Published on a watch channel so callers can wait for a refresh to land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncEpoch {
    pub identities: u64,
    pub documents: u64,
}

/// Statistics about the sync service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Total number of notifications received.
    pub notifications_received: u64,
    /// Notifications folded into a refresh that was already pending.
    pub notifications_coalesced: u64,
    /// Completed identity refreshes.
    pub identity_refreshes: u64,
    /// Completed document refreshes.
    pub document_refreshes: u64,
    /// Number of times the idle interval elapsed.
    pub timed_refreshes: u64,
}

// =============================================================================
// Cache Sync Service
// =============================================================================

/// Single writer of the cache snapshot.
pub struct CacheSyncService {
    store: Arc<dyn BackingStore>,
    snapshot: Arc<CacheSnapshot>,
    config: SyncConfig,

    receiver: Mutex<Option<mpsc::UnboundedReceiver<SyncRequest>>>,
    sender: mpsc::WeakUnboundedSender<SyncRequest>,
    shutdown: CancellationToken,
    epoch: watch::Sender<SyncEpoch>,

    /// Held for the duration of one category's reload.
    identities_guard: tokio::sync::Mutex<()>,
    documents_guard: tokio::sync::Mutex<()>,

    notifications_received: AtomicU64,
    notifications_coalesced: AtomicU64,
    identity_refreshes: AtomicU64,
    document_refreshes: AtomicU64,
    timed_refreshes: AtomicU64,
}

impl CacheSyncService {
    /// Create a sync service and the notifier that feeds it.
    ///
    /// The service stops on its own once every notifier clone is dropped.
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore>,
        snapshot: Arc<CacheSnapshot>,
        config: SyncConfig,
    ) -> (Self, SyncNotifier) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (epoch, _) = watch::channel(SyncEpoch {
            identities: snapshot.identities_version(),
            documents: snapshot.documents_version(),
        });

        let service = Self {
            store,
            snapshot,
            config,
            receiver: Mutex::new(Some(receiver)),
            sender: sender.downgrade(),
            shutdown: CancellationToken::new(),
            epoch,
            identities_guard: tokio::sync::Mutex::new(()),
            documents_guard: tokio::sync::Mutex::new(()),
            notifications_received: AtomicU64::new(0),
            notifications_coalesced: AtomicU64::new(0),
            identity_refreshes: AtomicU64::new(0),
            document_refreshes: AtomicU64::new(0),
            timed_refreshes: AtomicU64::new(0),
        };

        (service, SyncNotifier { sender })
    }

    /// Run the sync service.
    ///
    /// Refreshes both categories, then serves notifications and the idle
    /// timer until [`shutdown`](Self::shutdown) is called or every notifier
    /// is dropped.
    ///
    /// # Errors
    ///
    /// - [`CacheError::RefreshFailed`] on the first backing store failure
    /// - [`CacheError::AlreadyRunning`] if called a second time
    pub async fn run(&self) -> CacheResult<()> {
        let mut receiver = self.receiver.lock().take().ok_or(CacheError::AlreadyRunning)?;
        let idle_interval = self.config.idle_interval;

        tracing::info!(
            idle_interval_secs = idle_interval.as_secs_f64(),
            "Cache sync service starting"
        );

        for category in SyncRequest::ALL {
            self.refresh_now(category).await?;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::info!("Cache sync service shutting down");
                    return Ok(());
                }

                result = tokio::time::timeout(idle_interval, receiver.recv()) => {
                    match result {
                        Ok(Some(request)) => {
                            let pending = self.drain_pending(request, &mut receiver);
                            for category in pending {
                                self.refresh_now(category).await?;
                            }
                        }
                        Ok(None) => {
                            tracing::info!("Cache sync channel closed");
                            return Ok(());
                        }
                        Err(_) => {
                            tracing::debug!("Idle interval elapsed, refreshing all categories");
                            self.timed_refreshes.fetch_add(1, Ordering::Relaxed);
                            for category in SyncRequest::ALL {
                                self.refresh_now(category).await?;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Collect `first` and everything already queued behind it into one set
    /// of categories.
    fn drain_pending(
        &self,
        first: SyncRequest,
        receiver: &mut mpsc::UnboundedReceiver<SyncRequest>,
    ) -> BTreeSet<SyncRequest> {
        let mut pending = BTreeSet::from([first]);
        self.notifications_received.fetch_add(1, Ordering::Relaxed);

        while let Ok(request) = receiver.try_recv() {
            self.notifications_received.fetch_add(1, Ordering::Relaxed);
            if !pending.insert(request) {
                self.notifications_coalesced.fetch_add(1, Ordering::Relaxed);
            }
        }

        tracing::debug!(pending = ?pending, "Cache refresh requests received");
        pending
    }

    /// Reload one category from the backing store and swap it into the
    /// snapshot.
    ///
    /// At most one reload per category runs at a time; a concurrent call
    /// waits for the running one and then reloads again.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RefreshFailed`] if the backing store fails. The
    /// snapshot keeps its previous contents in that case.
    pub async fn refresh_now(&self, category: SyncRequest) -> CacheResult<()> {
        let _guard = match category {
            SyncRequest::RefreshIdentities => self.identities_guard.lock().await,
            SyncRequest::RefreshDocuments => self.documents_guard.lock().await,
        };
        let started = Instant::now();

        let outcome = match category {
            SyncRequest::RefreshIdentities => {
                self.store.fetch_all_identities().await.map(|map| {
                    let entries = map.len();
                    (entries, self.snapshot.replace_identities(map))
                })
            }
            SyncRequest::RefreshDocuments => {
                self.store.fetch_all_documents().await.map(|map| {
                    let entries = map.len();
                    (entries, self.snapshot.replace_documents(map))
                })
            }
        };

        match outcome {
            Ok((entries, version)) => {
                match category {
                    SyncRequest::RefreshIdentities => {
                        self.identity_refreshes.fetch_add(1, Ordering::Relaxed);
                        self.epoch.send_modify(|epoch| epoch.identities = version);
                    }
                    SyncRequest::RefreshDocuments => {
                        self.document_refreshes.fetch_add(1, Ordering::Relaxed);
                        self.epoch.send_modify(|epoch| epoch.documents = version);
                    }
                }

                tracing::info!(
                    category = %category,
                    entries = entries,
                    version = version,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cache category refreshed"
                );
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    category = %category,
                    error = %source,
                    "Cache refresh failed, snapshot can no longer be kept fresh"
                );
                Err(CacheError::RefreshFailed { category, source })
            }
        }
    }

    /// Signal the service to stop after the current refresh, if any.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Check if the service has been told to stop.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Watch the snapshot versions published after each refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncEpoch> {
        self.epoch.subscribe()
    }

    /// A new notifier for this service, or `None` once every notifier has
    /// been dropped.
    #[must_use]
    pub fn notifier(&self) -> Option<SyncNotifier> {
        self.sender.upgrade().map(|sender| SyncNotifier { sender })
    }

    /// Get sync statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_coalesced: self.notifications_coalesced.load(Ordering::Relaxed),
            identity_refreshes: self.identity_refreshes.load(Ordering::Relaxed),
            document_refreshes: self.document_refreshes.load(Ordering::Relaxed),
            timed_refreshes: self.timed_refreshes.load(Ordering::Relaxed),
        }
    }

    /// Get the snapshot this service writes to.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<CacheSnapshot> {
        &self.snapshot
    }

    /// Get the service configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
