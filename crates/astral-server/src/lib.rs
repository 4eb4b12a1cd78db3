pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{AuthError, Authenticator};
pub use blob::{BlobError, BlobStorage};
pub use config::{
    AppConfig, BlobBackend, BlobConfig, CacheConfig, LoggingConfig, PostgresStorageConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AstralServer, ServerBuilder, build_app};
pub use state::AppState;
