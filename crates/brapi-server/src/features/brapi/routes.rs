//! BrAPI HTTP routes
//!
//! Every versioned call is served by one handler which resolves the request
//! path against the call templates of the active release:
//!
//! - `GET /brapi/:version/serverinfo` - enabled calls
//! - `DELETE /brapi/:version/search` - clear cached searches (administrator)
//! - `GET /brapi/:version/<call>` - list or single object
//! - `POST /brapi/:version/search/<datatype>` - search, possibly deferred
//! - `GET /brapi/:version/search/<datatype>/:searchResultsDbId` - poll a search
//! - `POST /brapi/:version/<call>` - create objects
//! - `PUT /brapi/:version/<call>/:id` - update an object
//! - `DELETE /brapi/:version/<call>/:id` - delete objects

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::any,
    Router,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::calls::{self, ResolvedCall};
use super::commands::{self, CreateObjectsCommand, DeleteObjectsCommand, UpdateObjectCommand};
use super::queries::{
    self, FetchObjectsQuery, SearchObjectsQuery, SearchReply, SearchResultsQuery, ServerInfoQuery,
};
use crate::api::response::{BrapiResponse, MessageType, Pagination};
use crate::auth::{bearer_token, client_key, Caller};
use crate::error::{BrapiError, BrapiResult};
use crate::features::FeatureState;
use crate::mapping::Method;
use crate::query::PageRequest;
use crate::search::{DeferredQueue, SearchStatus};

// ============================================================================
// Router Configuration
// ============================================================================

pub fn brapi_routes() -> Router<FeatureState> {
    Router::new().route("/:version/*call", any(dispatch))
}

// ============================================================================
// Dispatch
// ============================================================================

/// Parsed request shared by the operation handlers
struct CallRequest<'a> {
    version: String,
    method: Method,
    resolved: ResolvedCall<'a>,
    datatype: String,
    caller: Caller,
    query: BTreeMap<String, String>,
    body: Option<Value>,
}

#[tracing::instrument(skip_all, fields(version = %version, call = %call, method = %method))]
async fn dispatch(
    State(state): State<FeatureState>,
    Path((version, call)): Path<(String, String)>,
    method: axum::http::Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    Extension(queue): Extension<DeferredQueue>,
    body: Bytes,
) -> BrapiResult<BrapiResponse> {
    let path = format!("/{}", call.trim_matches('/'));
    let caller = state
        .credentials
        .authenticate(bearer_token(&headers), &client_key(&headers))
        .await?;
    let method = Method::try_from(&method).map_err(BrapiError::BadInput)?;

    let catalog = state.engine.catalog();
    if catalog.release(&version).is_none() {
        return Err(BrapiError::NotFound(format!("Unknown BrAPI version {version}")));
    }

    match (method, path.as_str()) {
        (Method::Get, "/serverinfo") => {
            let info = queries::server_info::handle(catalog, ServerInfoQuery { version })?;
            return Ok(BrapiResponse::single(info));
        },
        (Method::Delete, "/search") => return clear_searches(&state, &caller, &version).await,
        _ => {},
    }

    let resolved = calls::resolve(catalog, &version, &path)
        .ok_or_else(|| BrapiError::NotFound(format!("Unknown call {path}")))?;
    let template = resolved.template();
    if !resolved.call.setting.methods.contains(&method) {
        return Err(BrapiError::BadInput(format!(
            "Method {method} is not supported by {template}"
        )));
    }
    if !state.policy.allows(&caller, template, method, resolved.call.setting) {
        return Err(denied(&caller, format!("Access to {method} {template} denied")));
    }

    let datatype = resolved
        .call
        .definition
        .datatype()
        .ok_or_else(|| BrapiError::Unprocessable(format!("Call {template} declares no data type")))?
        .to_string();

    let request = CallRequest {
        version,
        method,
        resolved,
        datatype,
        caller,
        query,
        body: parse_body(&body)?,
    };

    match method {
        Method::Get if request.resolved.is_search_results() => poll_search(&state, request).await,
        Method::Get => fetch_objects(&state, request).await,
        Method::Post if request.resolved.is_search() => search_objects(&state, &queue, request).await,
        Method::Post => create_objects(&state, request).await,
        Method::Put => update_object(&state, request).await,
        Method::Delete => delete_objects(&state, request).await,
    }
}

fn denied(caller: &Caller, message: String) -> BrapiError {
    if *caller == Caller::anonymous() {
        BrapiError::Unauthorized(message)
    } else {
        BrapiError::Forbidden(message)
    }
}

fn parse_body(body: &Bytes) -> BrapiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| BrapiError::BadInput(format!("Malformed JSON body: {e}")))
}

fn body_object(body: Option<Value>) -> BrapiResult<Map<String, Value>> {
    match body {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(BrapiError::BadInput("Expected a JSON object body".to_string())),
    }
}

fn search_response(status: SearchStatus) -> BrapiResult<BrapiResponse> {
    match status {
        SearchStatus::Accepted { job_id } | SearchStatus::Running { job_id } => {
            Ok(BrapiResponse::single(json!({ "searchResultsDbId": job_id }))
                .with_status(StatusCode::ACCEPTED))
        },
        SearchStatus::Done {
            items,
            total_count,
            page,
            ..
        } => Ok(BrapiResponse::list(items, Pagination::new(page, total_count))),
        SearchStatus::NotFound { job_id } => Err(BrapiError::NotFound(format!(
            "Search {job_id} is unknown or has expired"
        ))),
    }
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

async fn fetch_objects(state: &FeatureState, request: CallRequest<'_>) -> BrapiResult<BrapiResponse> {
    let query = FetchObjectsQuery {
        version: request.version,
        datatype: request.datatype,
        path_params: request.resolved.path_params,
        query: request.query,
        method: request.resolved.call.definition.methods.get(&request.method).cloned(),
    };
    let single = query.is_single();
    let page = queries::fetch::handle(&state.engine, query).await?;

    if single {
        let object = page.objects().into_iter().next().unwrap_or(Value::Null);
        return Ok(BrapiResponse::single(object).with_warnings(page.warnings));
    }
    Ok(BrapiResponse::page(&page))
}

async fn search_objects(
    state: &FeatureState,
    queue: &DeferredQueue,
    request: CallRequest<'_>,
) -> BrapiResult<BrapiResponse> {
    let query = SearchObjectsQuery {
        version: request.version,
        call: request.resolved.template().to_string(),
        datatype: request.datatype,
        body: body_object(request.body)?,
        query: request.query,
        roles: request.caller.sorted_roles(),
        deferred: request.resolved.call.setting.deferred,
        method: request.resolved.call.definition.methods.get(&request.method).cloned(),
    };

    match queries::search::handle(&state.engine, &state.searches, queue, query).await? {
        SearchReply::Page(page) => Ok(BrapiResponse::page(&page)),
        SearchReply::Job(status) => search_response(status),
    }
}

async fn poll_search(state: &FeatureState, request: CallRequest<'_>) -> BrapiResult<BrapiResponse> {
    let job_id = request
        .resolved
        .path_params
        .into_values()
        .next()
        .unwrap_or_default();
    let page: PageRequest = state.engine.pagination().page_from(&request.query, None);

    let status = queries::search::poll(&state.searches, SearchResultsQuery { job_id, page }).await;
    search_response(status)
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

async fn create_objects(state: &FeatureState, request: CallRequest<'_>) -> BrapiResult<BrapiResponse> {
    let objects = match request.body {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(BrapiError::BadInput("Expected a list of objects".to_string())),
            })
            .collect::<BrapiResult<Vec<_>>>()?,
        _ => return Err(BrapiError::BadInput("Expected a list of objects".to_string())),
    };

    let command = CreateObjectsCommand {
        version: request.version,
        datatype: request.datatype,
        objects,
    };
    let response = commands::create::handle(&state.engine, command).await?;

    let count = response.objects.len() as u64;
    Ok(
        BrapiResponse::list(response.objects, Pagination::new(PageRequest::unpaged(), count))
            .with_warnings(response.warnings),
    )
}

async fn update_object(state: &FeatureState, request: CallRequest<'_>) -> BrapiResult<BrapiResponse> {
    let object = match request.body {
        Some(Value::Object(map)) => map,
        _ => return Err(BrapiError::BadInput("Expected a JSON object body".to_string())),
    };

    let command = UpdateObjectCommand {
        version: request.version,
        datatype: request.datatype,
        identifier: request.resolved.path_params.into_values().next(),
        object,
    };
    let response = commands::update::handle(&state.engine, command).await?;
    Ok(BrapiResponse::single(response.object).with_warnings(response.warnings))
}

async fn delete_objects(state: &FeatureState, request: CallRequest<'_>) -> BrapiResult<BrapiResponse> {
    let mut filters: Map<String, Value> = request
        .query
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    for (key, value) in request.resolved.path_params {
        filters.insert(key, Value::String(value));
    }

    let command = DeleteObjectsCommand {
        version: request.version,
        datatype: request.datatype.clone(),
        filters,
    };
    let response = commands::delete::handle(&state.engine, command).await?;
    if response.deleted.is_empty() {
        return Err(BrapiError::NotFound(format!("No {} matched", request.datatype)));
    }
    Ok(BrapiResponse::single(json!({ "deletedDbIds": response.deleted })))
}

async fn clear_searches(
    state: &FeatureState,
    caller: &Caller,
    version: &str,
) -> BrapiResult<BrapiResponse> {
    if !caller.is_administrator() {
        return Err(denied(caller, "Clearing searches requires the administrator role".to_string()));
    }
    state.searches.invalidate_version(version).await;
    Ok(BrapiResponse::single(json!({}))
        .with_message(MessageType::Info, format!("Cleared cached searches of BrAPI {version}")))
}
