//! Deferred search lifecycle
//!
//! A job is identified by [`SearchJobKey::job_id`]. Its presence in the
//! [`JobCache`] is the only concurrency guard: a `Pending` or `Done` entry
//! means the job is never scheduled again until the entry expires.

use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::cache::JobCache;
use super::deferred::DeferredQueue;
use super::job::{SearchJobKey, SearchJobState, SearchStatus};
use crate::error::{BrapiError, BrapiResult};
use crate::query::PageRequest;

/// Tag carried by every cached search job
pub const SEARCH_CACHE_TAG: &str = "brapi_search";

/// Complete result of a search execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<Value>,
    pub total_count: u64,
}

/// Decrements the in-flight counter when a job finishes, however it finishes
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SearchJobCoordinator {
    cache: Arc<dyn JobCache>,
    ttl: Duration,
    max_pending: usize,
    in_flight: Arc<AtomicUsize>,
}

impl SearchJobCoordinator {
    pub fn new(cache: Arc<dyn JobCache>, ttl: Duration, max_pending: usize) -> Self {
        Self {
            cache,
            ttl,
            max_pending,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Jobs scheduled but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn tags(version: &str) -> Vec<String> {
        vec![
            SEARCH_CACHE_TAG.to_string(),
            format!("{SEARCH_CACHE_TAG}:{version}"),
        ]
    }

    /// Return the state of an existing job, or schedule `executor` on `queue`
    /// and answer `Accepted`
    ///
    /// Execution failures and panics resolve to an empty `Done` result.
    #[tracing::instrument(skip(self, key, queue, executor), fields(call = %key.call))]
    pub async fn submit_or_fetch<F>(
        &self,
        key: &SearchJobKey,
        page: PageRequest,
        queue: &DeferredQueue,
        executor: F,
    ) -> BrapiResult<SearchStatus>
    where
        F: Future<Output = BrapiResult<SearchOutcome>> + Send + 'static,
    {
        let job_id = key.job_id()?;
        if let Some(state) = self.state(&job_id).await {
            debug!(job_id = %job_id, "Search job already known");
            return Ok(Self::status(job_id, state, page));
        }

        let admitted = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_pending).then_some(n + 1)
            })
            .is_ok();
        if !admitted {
            warn!(job_id = %job_id, limit = self.max_pending, "Deferred search rejected");
            return Err(BrapiError::TooManyRequests(
                "Too many searches in progress, try again later".to_string(),
            ));
        }
        let guard = InFlightGuard(self.in_flight.clone());

        // The finished result lives until the submission's deadline, not past it
        let deadline = Instant::now() + self.ttl;
        let tags = Self::tags(&key.version);
        self.write(&job_id, &SearchJobState::pending(), self.ttl, &tags).await;

        let this = self.clone();
        let id = job_id.clone();
        queue
            .enqueue(async move {
                let _guard = guard;
                let state = match AssertUnwindSafe(executor).catch_unwind().await {
                    Ok(Ok(outcome)) => {
                        info!(job_id = %id, total = outcome.total_count, "Search job done");
                        SearchJobState::done(outcome.results, outcome.total_count)
                    },
                    Ok(Err(e)) => {
                        warn!(job_id = %id, error = %e, "Search job failed, storing empty result");
                        SearchJobState::empty()
                    },
                    Err(_) => {
                        error!(job_id = %id, "Search job panicked, storing empty result");
                        SearchJobState::empty()
                    },
                };
                let remaining = deadline.saturating_duration_since(Instant::now());
                this.write(&id, &state, remaining, &tags).await;
            })
            .await;

        info!(job_id = %job_id, "Search job accepted");
        Ok(SearchStatus::Accepted { job_id })
    }

    /// State of `job_id`, with `page` cut out of a finished result
    pub async fn poll(&self, job_id: &str, page: PageRequest) -> SearchStatus {
        match self.state(job_id).await {
            Some(state) => Self::status(job_id.to_string(), state, page),
            None => SearchStatus::NotFound {
                job_id: job_id.to_string(),
            },
        }
    }

    /// Drop every cached job of `version`
    pub async fn invalidate_version(&self, version: &str) {
        info!(version = %version, "Clearing cached searches");
        self.cache
            .invalidate_all(&[format!("{SEARCH_CACHE_TAG}:{version}")])
            .await;
    }

    async fn state(&self, job_id: &str) -> Option<SearchJobState> {
        let value = self.cache.get(job_id).await?;
        match serde_json::from_value(value) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Unreadable search job entry");
                None
            },
        }
    }

    async fn write(&self, job_id: &str, state: &SearchJobState, ttl: Duration, tags: &[String]) {
        match serde_json::to_value(state) {
            Ok(value) => self.cache.set(job_id, value, ttl, tags).await,
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to encode search job state"),
        }
    }

    fn status(job_id: String, state: SearchJobState, page: PageRequest) -> SearchStatus {
        match state {
            SearchJobState::Pending { .. } => SearchStatus::Running { job_id },
            SearchJobState::Done {
                results,
                total_count,
                ..
            } => SearchStatus::Done {
                job_id,
                items: page.slice(&results),
                total_count,
                page,
            },
        }
    }
}
