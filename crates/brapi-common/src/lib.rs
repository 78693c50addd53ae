//! BrAPI Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the BrAPI gateway workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Fingerprints**: Canonical JSON serialisation and stable digests, used to
//!   derive deferred search job identifiers
//! - **Logging**: Centralised `tracing` subscriber configuration
//!
//! # Example
//!
//! ```no_run
//! use brapi_common::fingerprint::fingerprint;
//! use serde_json::json;
//!
//! let a = fingerprint(&[&json!("search/germplasm"), &json!({"b": 1, "a": 2})]).ok();
//! let b = fingerprint(&[&json!("search/germplasm"), &json!({"a": 2, "b": 1})]).ok();
//! assert_eq!(a, b);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
