//! Integration tests for write command handlers
//!
//! These tests verify:
//! - Deletes refuse filters that would silently widen the match
//! - Creates refuse mappings that cannot address their own identifier

mod common;

use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use brapi_server::{
    error::BrapiError,
    features::brapi::commands::{self, CreateObjectsCommand, DeleteObjectsCommand},
    mapping::MappingCatalog,
    query::{BrapiEngine, PaginationSettings},
    storage::MemoryRecordStore,
};
use common::{get, test_app, test_state};

fn delete(filters: Value) -> DeleteObjectsCommand {
    let Value::Object(filters) = filters else { unreachable!() };
    DeleteObjectsCommand {
        version: "v2".to_string(),
        datatype: "Germplasm".to_string(),
        filters,
    }
}

#[tokio::test]
async fn test_delete_rejects_blank_operands() {
    let state = test_state();
    let engine = state.engine.clone();
    let app = test_app(state);

    for filters in [
        json!({"germplasmName": ""}),
        json!({"germplasmDbIds": []}),
        json!({"germplasmDbId": "1", "germplasmName": null}),
    ] {
        let result = commands::delete::handle(&engine, delete(filters.clone())).await;
        assert!(
            matches!(result, Err(BrapiError::BadInput(_))),
            "{filters} was not rejected"
        );
    }

    let (status, body) = get(&app, "/brapi/v2/germplasm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["pagination"]["totalCount"], 3);
}

#[tokio::test]
async fn test_delete_rejects_filters_the_translator_ignores() {
    let state = test_state();
    let engine = state.engine.clone();
    let app = test_app(state);

    // Mapped but absent from the schema, so never translated into a filter
    let result = commands::delete::handle(&engine, delete(json!({"curationStatus": "retired"}))).await;
    assert!(matches!(result, Err(BrapiError::BadInput(_))));

    let result = commands::delete::handle(&engine, delete(json!({"colour": "red"}))).await;
    assert!(matches!(result, Err(BrapiError::BadInput(_))));

    let (_, body) = get(&app, "/brapi/v2/germplasm").await;
    assert_eq!(body["metadata"]["pagination"]["totalCount"], 3);
}

#[tokio::test]
async fn test_delete_by_mapped_filter() {
    let state = test_state();
    let engine = state.engine.clone();

    let response = commands::delete::handle(&engine, delete(json!({"germplasmName": "B73"})))
        .await
        .unwrap();
    assert_eq!(response.deleted, vec!["3".to_string()]);
}

#[tokio::test]
async fn test_create_requires_mapped_identifier() {
    let doc = json!({
        "schemas": [{
            "version": "v2",
            "release": "2.1",
            "datatypes": {
                "Germplasm": {"fields": {
                    "germplasmDbId": {"type": "string"},
                    "germplasmName": {"type": "string"}
                }}
            },
            "calls": {}
        }],
        "mappings": [{
            "id": "v2-2.1-Germplasm",
            "contentTarget": {"kind": "germplasm"},
            "fieldRules": {
                "germplasmName": {"kind": "direct", "field": "name"}
            }
        }]
    });
    let active = BTreeMap::from([("v2".to_string(), "2.1".to_string())]);
    let catalog = MappingCatalog::from_json_str(&doc.to_string(), &active).unwrap();
    let engine = BrapiEngine::new(
        Arc::new(catalog),
        Arc::new(MemoryRecordStore::new()),
        PaginationSettings::default(),
    );

    let mut object = Map::new();
    object.insert("germplasmDbId".to_string(), json!("G-1"));
    object.insert("germplasmName".to_string(), json!("Azucena"));
    let command = CreateObjectsCommand {
        version: "v2".to_string(),
        datatype: "Germplasm".to_string(),
        objects: vec![object],
    };

    let result = commands::create::handle(&engine, command).await;
    assert!(matches!(result, Err(BrapiError::Unprocessable(_))));
}

#[tokio::test]
async fn test_create_conflicts_with_existing_identifier() {
    let state = test_state();

    let mut object = Map::new();
    object.insert("germplasmDbId".to_string(), json!("2"));
    let command = CreateObjectsCommand {
        version: "v2".to_string(),
        datatype: "Germplasm".to_string(),
        objects: vec![object],
    };

    let result = commands::create::handle(&state.engine, command).await;
    assert!(matches!(result, Err(BrapiError::Conflict(_))));
}
