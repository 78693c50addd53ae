//! Deferred search job identity and states

use brapi_common::fingerprint::fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{BrapiError, BrapiResult};
use crate::mapping::schema::RESERVED_PARAMETERS;
use crate::query::PageRequest;

/// Inputs a job identifier is derived from
#[derive(Debug, Clone, PartialEq)]
pub struct SearchJobKey {
    /// Major version, e.g. `v2`
    pub version: String,
    /// Call template, e.g. `/search/germplasm`
    pub call: String,
    pub filters: Map<String, Value>,
    pub roles: Vec<String>,
}

impl SearchJobKey {
    /// Paging parameters are dropped from `filters`; they apply when polling
    pub fn new(
        version: impl Into<String>,
        call: impl Into<String>,
        mut filters: Map<String, Value>,
        roles: Vec<String>,
    ) -> Self {
        for reserved in RESERVED_PARAMETERS {
            filters.remove(*reserved);
        }
        let mut roles = roles;
        roles.sort();
        roles.dedup();
        Self {
            version: version.into(),
            call: call.into(),
            filters,
            roles,
        }
    }

    /// Stable hash of the versioned call, the non-empty filters and the roles
    pub fn job_id(&self) -> BrapiResult<String> {
        fingerprint(&[
            &json!(format!("{}{}", self.version, self.call)),
            &Value::Object(self.filters.clone()),
            &json!(self.roles),
        ])
        .map_err(|e| BrapiError::Internal(format!("Failed to derive search job id: {e}")))
    }
}

/// Cached state of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchJobState {
    Pending {
        submitted_at: DateTime<Utc>,
    },
    Done {
        results: Vec<Value>,
        total_count: u64,
        completed_at: DateTime<Utc>,
    },
}

impl SearchJobState {
    pub fn pending() -> Self {
        SearchJobState::Pending {
            submitted_at: Utc::now(),
        }
    }

    pub fn done(results: Vec<Value>, total_count: u64) -> Self {
        SearchJobState::Done {
            results,
            total_count,
            completed_at: Utc::now(),
        }
    }

    /// What failed and empty searches resolve to
    pub fn empty() -> Self {
        Self::done(Vec::new(), 0)
    }
}

/// Outcome of a submission or poll
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStatus {
    /// Newly scheduled
    Accepted { job_id: String },
    Running { job_id: String },
    /// One page of the complete result
    Done {
        job_id: String,
        items: Vec<Value>,
        total_count: u64,
        page: PageRequest,
    },
    /// Unknown or expired
    NotFound { job_id: String },
}

impl SearchStatus {
    pub fn job_id(&self) -> &str {
        match self {
            SearchStatus::Accepted { job_id }
            | SearchStatus::Running { job_id }
            | SearchStatus::Done { job_id, .. }
            | SearchStatus::NotFound { job_id } => job_id,
        }
    }
}
