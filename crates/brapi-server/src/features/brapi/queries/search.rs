//! Search calls and deferred search polling

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{BrapiError, BrapiResult};
use crate::mapping::MethodDefinition;
use crate::query::{BrapiEngine, DataPage, DataRequest, PageRequest};
use crate::search::{DeferredQueue, SearchJobCoordinator, SearchJobKey, SearchOutcome, SearchStatus};

/// `POST /search/<datatype>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchObjectsQuery {
    pub version: String,
    /// Call template, part of the job identity
    pub call: String,
    pub datatype: String,
    pub body: Map<String, Value>,
    /// Query string parameters, applied alongside the body
    pub query: BTreeMap<String, String>,
    /// Caller roles, part of the job identity
    pub roles: Vec<String>,
    pub deferred: bool,
    #[serde(skip)]
    pub method: Option<MethodDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchReply {
    /// Immediate result
    Page(DataPage),
    /// Deferred job state
    Job(SearchStatus),
}

impl Request<BrapiResult<SearchReply>> for SearchObjectsQuery {}

#[tracing::instrument(skip_all, fields(call = %query.call, deferred = query.deferred))]
pub async fn handle(
    engine: &BrapiEngine,
    coordinator: &SearchJobCoordinator,
    queue: &DeferredQueue,
    query: SearchObjectsQuery,
) -> BrapiResult<SearchReply> {
    let mapping = engine.mapping_for(&query.version, &query.datatype)?;
    let mut request = DataRequest::search(query.body).with_method(query.method);
    request.query = query.query;
    if !query.deferred {
        return Ok(SearchReply::Page(engine.fetch(mapping, &request).await?));
    }

    let page = engine.pagination().page_from(&request.query, request.body.as_ref());
    let key = SearchJobKey::new(
        &query.version,
        &query.call,
        job_filters(&request),
        query.roles,
    );

    let engine = engine.clone();
    let mapping = mapping.clone();
    let executor = async move {
        let request = request.unpaged();
        let found = engine.fetch(&mapping, &request).await?;
        Ok::<_, BrapiError>(SearchOutcome {
            results: found.objects(),
            total_count: found.total_count,
        })
    };

    coordinator
        .submit_or_fetch(&key, page, queue, executor)
        .await
        .map(SearchReply::Job)
}

/// Filters identifying a deferred search: the body overlaid with the query string
fn job_filters(request: &DataRequest) -> Map<String, Value> {
    let mut filters = request.body.clone().unwrap_or_default();
    for (key, value) in &request.query {
        filters.insert(key.clone(), Value::String(value.clone()));
    }
    filters
}

/// `GET /search/<datatype>/{searchResultsDbId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultsQuery {
    pub job_id: String,
    pub page: PageRequest,
}

impl Request<SearchStatus> for SearchResultsQuery {}

#[tracing::instrument(skip(coordinator))]
pub async fn poll(coordinator: &SearchJobCoordinator, query: SearchResultsQuery) -> SearchStatus {
    coordinator.poll(&query.job_id, query.page).await
}
