//! Application assembly: shared state, router and top-level handlers

pub mod response;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tracing::info;

use crate::auth::{FailedAttemptThrottle, RoleAccessPolicy, StaticTokenCredentials};
use crate::config::{Config, CorsConfig, StoreBackend};
use crate::features::{self, FeatureState};
use crate::mapping::MappingCatalog;
use crate::middleware;
use crate::query::BrapiEngine;
use crate::search::{MemoryJobCache, SearchJobCoordinator};
use crate::storage::{MemoryRecordStore, PgRecordStore, RecordStore};

/// Everything the server needs once configuration has been applied
#[derive(Clone)]
pub struct AppState {
    pub features: FeatureState,
    /// Backing cache of the search coordinator, purged periodically
    pub job_cache: Arc<MemoryJobCache>,
    /// Failed-authentication limiter, pruned on the same schedule
    pub auth_throttle: Arc<FailedAttemptThrottle>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = MappingCatalog::load(&config.brapi.catalog_path, &config.brapi.active_releases)?;
        let store = open_store(config).await?;
        let engine = BrapiEngine::new(Arc::new(catalog), store, config.brapi.pagination);

        let job_cache = Arc::new(MemoryJobCache::new());
        let searches = SearchJobCoordinator::new(
            job_cache.clone(),
            Duration::from_secs(config.brapi.search_ttl_secs),
            config.brapi.max_pending_searches,
        );

        let auth_throttle = Arc::new(FailedAttemptThrottle::default());
        let credentials = StaticTokenCredentials::new(config.brapi.tokens.clone())
            .with_throttle(auth_throttle.clone());

        let features = FeatureState {
            engine,
            searches,
            credentials: Arc::new(credentials),
            policy: Arc::new(RoleAccessPolicy),
        };

        Ok(Self {
            features,
            job_cache,
            auth_throttle,
        })
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = match config.store.seed_path {
                Some(ref path) => MemoryRecordStore::from_seed_file(path)?,
                None => MemoryRecordStore::new(),
            };
            info!("Using in-memory record store");
            Ok(Arc::new(store))
        },
        StoreBackend::Postgres => {
            let database = &config.store.database;
            let url = database
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;

            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
                .idle_timeout(Duration::from_secs(database.idle_timeout_secs))
                .connect(url)
                .await?;
            info!("Database connection pool created");

            sqlx::migrate!("../../migrations").run(&pool).await?;
            info!("Database migrations applied");

            Ok(Arc::new(PgRecordStore::new(pool)))
        },
    }
}

/// Full application router with panic recovery, compression, request tracing and CORS
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(features::router(state))
        .layer(middleware::catch_panic_layer())
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "BrAPI Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
