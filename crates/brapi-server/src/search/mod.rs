//! Deferred ("asynchronous") BrAPI searches
//!
//! - [`cache`]: job status/result cache with TTL and tags
//! - [`job`]: job identity and states
//! - [`deferred`]: per-request queue of work that runs after the response
//! - [`coordinator`]: the submit/poll protocol

pub mod cache;
pub mod coordinator;
pub mod deferred;
pub mod job;

pub use cache::{JobCache, MemoryJobCache};
pub use coordinator::{SearchJobCoordinator, SearchOutcome, SEARCH_CACHE_TAG};
pub use deferred::DeferredQueue;
pub use job::{SearchJobKey, SearchJobState, SearchStatus};
