//! End-to-end consistency of writes, notifications and reads.

use std::sync::Arc;
use std::time::Duration;

use astral_cache::{
    AccessResolver, BackingStore, CacheSnapshot, CacheSyncService, MemoryStore, NewDocument,
    SyncConfig, SyncEpoch, SyncNotifier, SyncRequest,
};
use tokio::sync::watch;

struct Cache {
    store: Arc<MemoryStore>,
    service: Arc<CacheSyncService>,
    resolver: AccessResolver,
    notifier: SyncNotifier,
    epochs: watch::Receiver<SyncEpoch>,
}

async fn start_cache() -> Cache {
    let store = Arc::new(MemoryStore::new());
    let snapshot = Arc::new(CacheSnapshot::new());
    let (service, notifier) = CacheSyncService::new(
        store.clone(),
        snapshot.clone(),
        SyncConfig::with_idle_interval(Duration::from_secs(3600)),
    );
    let service = Arc::new(service);
    let mut epochs = service.subscribe();

    tokio::spawn({
        let service = service.clone();
        async move { service.run().await }
    });
    epochs
        .wait_for(|e| e.identities >= 1 && e.documents >= 1)
        .await
        .unwrap();

    Cache {
        store,
        service,
        resolver: AccessResolver::new(snapshot),
        notifier,
        epochs,
    }
}

impl Cache {
    /// Notify and wait until the category has been reloaded.
    async fn sync(&mut self, request: SyncRequest) {
        let before = *self.epochs.borrow();
        self.notifier.notify(request);
        self.epochs
            .wait_for(|e| match request {
                SyncRequest::RefreshIdentities => e.identities > before.identities,
                SyncRequest::RefreshDocuments => e.documents > before.documents,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn token_lifecycle_is_visible_after_refresh() {
    let mut cache = start_cache().await;
    let alice = cache.store.create_user("alice", "hash").await.unwrap();
    let token = cache.store.create_token(alice.id).await.unwrap();

    // Written but not yet refreshed.
    assert!(cache.resolver.resolve_token(&token.token).is_none());

    cache.sync(SyncRequest::RefreshIdentities).await;
    let identity = cache.resolver.resolve_token(&token.token).unwrap();
    assert_eq!(identity.user_id, alice.id);
    assert_eq!(identity.login, "alice");

    cache.store.delete_token(&token.token).await.unwrap();
    cache.sync(SyncRequest::RefreshIdentities).await;
    assert!(cache.resolver.resolve_token(&token.token).is_none());
}

#[tokio::test]
async fn private_document_grants_exclude_owner() {
    let mut cache = start_cache().await;
    cache.store.create_user("alice", "hash").await.unwrap();
    cache.store.create_user("bob", "hash").await.unwrap();
    let carol = cache.store.create_user("carol", "hash").await.unwrap();

    cache
        .store
        .create_document(NewDocument {
            filename: "plan.md".to_string(),
            public: false,
            mime: "text/markdown".to_string(),
            owner: carol.id,
            grant: vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
        })
        .await
        .unwrap();
    cache.sync(SyncRequest::RefreshDocuments).await;

    let listed = cache.resolver.list_documents(0);
    assert_eq!(listed.len(), 1);
    let mut grant = listed[0].grant.clone();
    grant.sort();
    assert_eq!(grant, vec!["alice", "bob"]);

    let by_name = cache.resolver.lookup_document_by_name("plan.md").unwrap();
    assert_eq!(by_name.owner, carol.id);
    assert_eq!(
        cache.resolver.lookup_document_by_id(by_name.id).unwrap().filename,
        "plan.md"
    );
}

#[tokio::test]
async fn list_documents_limit() {
    let mut cache = start_cache().await;
    let owner = cache.store.create_user("owner", "hash").await.unwrap();
    for i in 0..5 {
        cache
            .store
            .create_document(NewDocument {
                filename: format!("file-{i}.bin"),
                public: true,
                mime: "application/octet-stream".to_string(),
                owner: owner.id,
                grant: Vec::new(),
            })
            .await
            .unwrap();
    }
    cache.sync(SyncRequest::RefreshDocuments).await;

    assert_eq!(cache.resolver.list_documents(2).len(), 2);
    assert_eq!(cache.resolver.list_documents(0).len(), 5);
}

#[tokio::test]
async fn deleted_document_disappears_after_refresh() {
    let mut cache = start_cache().await;
    let owner = cache.store.create_user("owner", "hash").await.unwrap();
    let doc = cache
        .store
        .create_document(NewDocument {
            filename: "gone.txt".to_string(),
            public: true,
            mime: "text/plain".to_string(),
            owner: owner.id,
            grant: Vec::new(),
        })
        .await
        .unwrap();
    cache.sync(SyncRequest::RefreshDocuments).await;
    assert!(cache.resolver.lookup_document_by_id(doc.id).is_some());

    cache.store.delete_document(doc.id).await.unwrap();
    cache.sync(SyncRequest::RefreshDocuments).await;
    assert!(cache.resolver.lookup_document_by_id(doc.id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lookups_during_refreshes_see_whole_maps() {
    const SMALL: usize = 3;
    const LARGE: usize = 40;

    let cache = start_cache().await;
    let owner = cache.store.create_user("owner", "hash").await.unwrap();
    for i in 0..SMALL {
        cache
            .store
            .create_document(NewDocument {
                filename: format!("small-{i:02}"),
                public: true,
                mime: "text/plain".to_string(),
                owner: owner.id,
                grant: Vec::new(),
            })
            .await
            .unwrap();
    }
    cache
        .service
        .refresh_now(SyncRequest::RefreshDocuments)
        .await
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let resolver = cache.resolver.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let len = resolver.list_documents(0).len();
                    assert!(len == SMALL || len == SMALL + LARGE, "partial map of {len}");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    // Flip between two store states so each refresh swaps in a map of a
    // different size.
    let mut extra = Vec::new();
    for round in 0..50 {
        if round % 2 == 0 {
            for i in 0..LARGE {
                let doc = cache
                    .store
                    .create_document(NewDocument {
                        filename: format!("large-{round}-{i:02}"),
                        public: true,
                        mime: "text/plain".to_string(),
                        owner: owner.id,
                        grant: Vec::new(),
                    })
                    .await
                    .unwrap();
                extra.push(doc.id);
            }
        } else {
            for id in extra.drain(..) {
                cache.store.delete_document(id).await.unwrap();
            }
        }
        cache
            .service
            .refresh_now(SyncRequest::RefreshDocuments)
            .await
            .unwrap();
    }

    for reader in readers {
        reader.await.unwrap();
    }
}
