//! BrAPI Server Library
//!
//! Serves the Breeding API (BrAPI) over an arbitrary record store by mapping
//! each BrAPI datatype onto backend records through a configurable catalog.
//!
//! # Overview
//!
//! - **Mapping catalog** ([`mapping`]): versioned BrAPI schemas, datatype
//!   mappings and per-call settings, validated once at startup
//! - **Query translation** ([`query`]): BrAPI filters become store queries,
//!   records become BrAPI objects, unsupported filters run on projected output
//! - **Record stores** ([`storage`]): in-memory and PostgreSQL backends
//! - **Deferred searches** ([`search`]): submit/poll search jobs keyed by
//!   their filters and the caller's roles
//! - **Access control** ([`auth`]): bearer tokens mapped to roles, checked
//!   against per-call role requirements
//!
//! # Architecture
//!
//! HTTP handlers live in [`features`], organized as commands (create, update,
//! delete) and queries (fetch, search, server info). Every response uses the
//! BrAPI envelope from [`api::response`]; failures are [`BrapiError`]s.
//!
//! # Example
//!
//! ```no_run
//! use brapi_server::{api::{self, AppState}, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = AppState::from_config(&config).await?;
//!     let app = api::create_router(state.features, &config.cors);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod features;
pub mod mapping;
pub mod middleware;
pub mod query;
pub mod search;
pub mod storage;

// Re-export commonly used types
pub use error::{BrapiError, BrapiResult};
