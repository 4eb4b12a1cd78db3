use std::{future::IntoFuture, net::SocketAddr, sync::Arc};

use anyhow::Context;
use astral_cache::{
    AccessResolver, BackingStore, CacheSnapshot, CacheSyncService, MemoryStore, SyncConfig,
    SyncNotifier,
};
use astral_postgres::PostgresStore;
use axum::{Router, middleware, routing::get};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    blob::BlobStorage,
    config::{AppConfig, StorageBackend},
    middleware::{self as app_middleware, RequestId},
    routes,
    state::AppState,
};

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(routes::health::healthz))
        .nest("/api", routes::api_router())
        .with_state(state)
        // Layers listed innermost first; request ids are assigned before tracing.
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .map(RequestId::as_str)
                        .unwrap_or("");
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

// =============================================================================
// Server Builder
// =============================================================================

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connect the backing and blob stores and wire up the cache.
    ///
    /// The cache is empty until [`AstralServer::run`] starts the sync service.
    pub async fn build(self) -> anyhow::Result<AstralServer> {
        let store = connect_store(&self.config).await?;
        let blobs =
            BlobStorage::from_config(&self.config.blob).context("blob storage initialization")?;

        let snapshot = Arc::new(CacheSnapshot::new());
        let (sync, notifier) = CacheSyncService::new(
            store.clone(),
            snapshot.clone(),
            SyncConfig::with_idle_interval(self.config.idle_refresh_interval()),
        );

        let state = AppState::new(
            store,
            AccessResolver::new(snapshot),
            notifier.clone(),
            blobs,
            self.config.server.root_token.clone(),
        );
        let app = build_app(state, &self.config);

        Ok(AstralServer {
            addr: self.addr,
            app,
            sync: Arc::new(sync),
            notifier,
        })
    }
}

async fn connect_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn BackingStore>> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory backing store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let pg = cfg
                .storage
                .postgres
                .as_ref()
                .context("storage.postgres is not configured")?;
            let store = PostgresStore::connect(&pg.to_postgres_config())
                .await
                .context("postgres initialization")?;
            Ok(Arc::new(store))
        }
    }
}

// =============================================================================
// Server
// =============================================================================

pub struct AstralServer {
    addr: SocketAddr,
    app: Router,
    sync: Arc<CacheSyncService>,
    // Keeps the sync loop alive for as long as the server runs.
    notifier: SyncNotifier,
}

impl AstralServer {
    /// Router with all routes and middleware, for driving requests directly.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn sync_service(&self) -> &Arc<CacheSyncService> {
        &self.sync
    }

    /// Load the cache, then serve until Ctrl+C.
    ///
    /// A failed cache refresh stops the server and is returned as an error.
    pub async fn run(self) -> anyhow::Result<()> {
        let sync = self.sync.clone();
        let mut epoch = sync.subscribe();
        let mut sync_task = tokio::spawn(async move { sync.run().await });

        tokio::select! {
            ready = wait_for_initial_load(&mut epoch) => ready?,
            joined = &mut sync_task => {
                joined.context("cache sync task panicked")??;
                anyhow::bail!("cache sync service stopped before the initial load");
            }
        }

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let serve = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future();

        tokio::select! {
            served = serve => {
                served?;
                self.sync.shutdown();
                drop(self.notifier);
                match sync_task.await.context("cache sync task panicked")? {
                    Ok(()) => Ok(()),
                    Err(e) => Err(anyhow::Error::new(e).context("cache refresh failed")),
                }
            }
            joined = &mut sync_task => {
                match joined.context("cache sync task panicked")? {
                    Ok(()) => Err(anyhow::anyhow!("cache sync service stopped unexpectedly")),
                    Err(e) => Err(anyhow::Error::new(e).context("cache refresh failed")),
                }
            }
        }
    }
}

async fn wait_for_initial_load(
    epoch: &mut watch::Receiver<astral_cache::SyncEpoch>,
) -> anyhow::Result<()> {
    epoch
        .wait_for(|e| e.identities > 0 && e.documents > 0)
        .await
        .context("cache sync service went away")?;
    tracing::info!("cache loaded");
    Ok(())
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
