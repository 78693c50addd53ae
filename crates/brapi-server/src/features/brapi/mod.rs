//! BrAPI feature slice
//!
//! - `calls.rs` - request path to call template resolution
//! - `commands/` - create, update, delete
//! - `queries/` - fetch, search, search polling, server info
//! - `routes.rs` - HTTP dispatch

pub mod calls;
pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::brapi_routes;
