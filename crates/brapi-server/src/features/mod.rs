//! Feature modules implementing the BrAPI HTTP surface
//!
//! Each feature is organized as a vertical slice with its own commands,
//! queries, and routes:
//!
//! - `commands/` - Write operations (create, update, delete)
//! - `queries/` - Read operations (fetch, search, server info)
//! - `routes.rs` - HTTP route definitions
//!
//! Commands and queries are plain request types implementing the `mediator`
//! crate's `Request` trait, handled by standalone async functions.

pub mod brapi;

use axum::Router;
use std::sync::Arc;

use crate::auth::{AccessPolicy, CredentialService};
use crate::middleware::drain_deferred;
use crate::query::BrapiEngine;
use crate::search::SearchJobCoordinator;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Catalog, record store and read pipeline
    pub engine: BrapiEngine,
    /// Deferred search jobs
    pub searches: SearchJobCoordinator,
    pub credentials: Arc<dyn CredentialService>,
    pub policy: Arc<dyn AccessPolicy>,
}

/// Creates the BrAPI router, mounted under `/brapi`
///
/// Work deferred by a handler runs once its response has been produced.
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/brapi", brapi::brapi_routes().with_state(state))
        .layer(axum::middleware::from_fn(drain_deferred))
}
