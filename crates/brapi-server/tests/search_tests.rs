//! Integration tests for search calls
//!
//! These tests verify:
//! - Deferred searches answer 202 with a job id and complete after the response
//! - Polling pages through the finished result
//! - Job identity covers filters and caller roles, not pagination
//! - Immediate searches, unknown jobs, admission limits and clearing

mod common;

use axum::{
    http::{Method, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;

use brapi_server::query::PaginationSettings;
use common::{data, get, messages, send, test_app, test_state, test_state_with, ADMIN_TOKEN, CURATOR_TOKEN, VIEWER_TOKEN};

async fn submit(app: &Router, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, "/brapi/v2/search/germplasm", token, Some(body)).await
}

/// Poll until the job stops answering 202
async fn poll_until_done(app: &Router, job_id: &str, query: &str) -> (StatusCode, Value) {
    let uri = format!("/brapi/v2/search/germplasm/{job_id}{query}");
    for _ in 0..100 {
        let (status, body) = get(app, &uri).await;
        if status != StatusCode::ACCEPTED {
            return (status, body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("search {job_id} did not finish");
}

fn job_id(body: &Value) -> String {
    body["result"]["searchResultsDbId"]
        .as_str()
        .expect("missing searchResultsDbId")
        .to_string()
}

#[tokio::test]
async fn test_deferred_search_completes() {
    let app = test_app(test_state());

    let (status, body) = submit(&app, None, json!({"commonCropNames": ["rice"]})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id = job_id(&body);

    let (status, body) = poll_until_done(&app, &id, "?pageSize=1").await;
    assert_eq!(status, StatusCode::OK);

    let items = data(&body);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["germplasmDbId"], "1");
    assert_eq!(body["metadata"]["pagination"]["totalCount"], 2);
    assert_eq!(body["metadata"]["pagination"]["totalPages"], 2);

    let (_, body) = poll_until_done(&app, &id, "?page=1&pageSize=1").await;
    assert_eq!(data(&body)[0]["germplasmDbId"], "2");
}

#[tokio::test]
async fn test_resubmitting_returns_same_job() {
    let app = test_app(test_state());

    let (_, first) = submit(&app, None, json!({"germplasmNames": ["B73"], "pageSize": 5})).await;
    let id = job_id(&first);
    poll_until_done(&app, &id, "").await;

    // Pagination is not part of the job identity
    let (status, body) = submit(&app, None, json!({"germplasmNames": ["B73"], "pageSize": 20})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data(&body).len(), 1);
    assert_eq!(data(&body)[0]["germplasmName"], "B73");
}

#[tokio::test]
async fn test_job_identity_includes_roles() {
    let app = test_app(test_state());
    let filters = json!({"germplasmNames": ["IR64"]});

    let (_, anonymous) = submit(&app, None, filters.clone()).await;
    let (_, viewer) = submit(&app, Some(VIEWER_TOKEN), filters.clone()).await;
    let (_, viewer_again) = submit(&app, Some(VIEWER_TOKEN), filters).await;

    assert_ne!(job_id(&anonymous), job_id(&viewer));
    let viewer_id = job_id(&viewer);
    let again = viewer_again["result"]["searchResultsDbId"].as_str();
    // Either still running (same id) or already done (results inline)
    assert!(again.is_none() || again == Some(viewer_id.as_str()));
}

#[tokio::test]
async fn test_immediate_search() {
    let app = test_app(test_state());

    let (status, body) = send(
        &app,
        Method::POST,
        "/brapi/v1/search/germplasm",
        None,
        Some(json!({"germplasmNames": ["B73"], "colour": "red"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let items = data(&body);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["defaultDisplayName"], "B73");
    assert_eq!(body["metadata"]["status"][0]["messageType"], "WARNING");
}

#[tokio::test]
async fn test_immediate_search_applies_query_string() {
    let app = test_app(test_state());

    let (status, body) = send(
        &app,
        Method::POST,
        "/brapi/v1/search/germplasm?germplasmName=B73&flavour=sweet",
        None,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let items = data(&body);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["germplasmName"], "B73");
    assert!(messages(&body).contains(&"Unsupported query filter: flavour".to_string()));
}

#[tokio::test]
async fn test_deferred_search_applies_query_string() {
    let app = test_app(test_state());

    let (status, b73) = send(
        &app,
        Method::POST,
        "/brapi/v2/search/germplasm?germplasmName=B73",
        None,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (_, ir64) = send(
        &app,
        Method::POST,
        "/brapi/v2/search/germplasm?germplasmName=IR64",
        None,
        Some(json!({})),
    )
    .await;
    assert_ne!(job_id(&b73), job_id(&ir64));

    let (status, body) = poll_until_done(&app, &job_id(&b73), "").await;
    assert_eq!(status, StatusCode::OK);
    let items = data(&body);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["germplasmName"], "B73");
}

#[tokio::test]
async fn test_malformed_search_body() {
    let app = test_app(test_state());

    let (status, _) = submit(&app, None, json!(["not", "an", "object"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job() {
    let app = test_app(test_state());

    let (status, body) = get(&app, "/brapi/v2/search/germplasm/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["metadata"]["status"][0]["messageType"], "ERROR");
}

#[tokio::test]
async fn test_admission_limit() {
    let app = test_app(test_state_with(PaginationSettings::default(), 0));

    let (status, _) = submit(&app, None, json!({"germplasmNames": ["IR64"]})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_clear_searches() {
    let app = test_app(test_state());

    let (_, body) = submit(&app, None, json!({"accessionNumbers": ["A-0001"]})).await;
    let id = job_id(&body);
    poll_until_done(&app, &id, "").await;

    let (status, _) = send(&app, Method::DELETE, "/brapi/v2/search", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::DELETE, "/brapi/v2/search", Some(CURATOR_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, "/brapi/v2/search", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app, &format!("/brapi/v2/search/germplasm/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
