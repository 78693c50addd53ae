//! Common test utilities for BrAPI server integration tests
//!
//! Builds the full application over the shipped catalog and an in-memory
//! store seeded from `config/seed-records.json`, and drives it with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use brapi_server::{
    api,
    auth::{RoleAccessPolicy, StaticTokenCredentials},
    config::Config,
    features::FeatureState,
    mapping::MappingCatalog,
    query::{BrapiEngine, PaginationSettings},
    search::{MemoryJobCache, SearchJobCoordinator},
    storage::MemoryRecordStore,
};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const CURATOR_TOKEN: &str = "curator-token";
pub const VIEWER_TOKEN: &str = "viewer-token";

fn repo_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(name)
}

pub fn catalog_path() -> PathBuf {
    repo_file("brapi-catalog.json")
}

pub fn seed_path() -> PathBuf {
    repo_file("seed-records.json")
}

pub fn active_releases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("v1".to_string(), "1.3".to_string()),
        ("v2".to_string(), "2.1".to_string()),
    ])
}

pub fn tokens() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (ADMIN_TOKEN.to_string(), vec!["administrator".to_string()]),
        (CURATOR_TOKEN.to_string(), vec!["curator".to_string()]),
        (VIEWER_TOKEN.to_string(), vec!["viewer".to_string()]),
    ])
}

/// Feature state over the seeded memory store
pub fn test_state() -> FeatureState {
    test_state_with(PaginationSettings::default(), 16)
}

pub fn test_state_with(pagination: PaginationSettings, max_pending: usize) -> FeatureState {
    let catalog = MappingCatalog::load(catalog_path(), &active_releases())
        .expect("Failed to load catalog");
    let store = MemoryRecordStore::from_seed_file(seed_path()).expect("Failed to load seed");

    FeatureState {
        engine: BrapiEngine::new(Arc::new(catalog), Arc::new(store), pagination),
        searches: SearchJobCoordinator::new(
            Arc::new(MemoryJobCache::new()),
            Duration::from_secs(60),
            max_pending,
        ),
        credentials: Arc::new(StaticTokenCredentials::new(tokens())),
        policy: Arc::new(RoleAccessPolicy),
    }
}

pub fn test_app(state: FeatureState) -> Router {
    api::create_router(state, &Config::default().cors)
}

/// Send one request and decode the JSON body (`Null` when empty)
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        },
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, None).await
}

/// `result.data` of a list response
pub fn data(body: &Value) -> Vec<Value> {
    body["result"]["data"].as_array().cloned().unwrap_or_default()
}

/// Messages of the response status list
pub fn messages(body: &Value) -> Vec<String> {
    body["metadata"]["status"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|status| status["message"].as_str().map(str::to_string))
        .collect()
}
