//! Calls offered by this server

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BrapiError, BrapiResult};
use crate::mapping::MappingCatalog;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoQuery {
    pub version: String,
}

impl Request<BrapiResult<Value>> for ServerInfoQuery {}

/// `serverinfo` result listing every enabled call of the active release
pub fn handle(catalog: &MappingCatalog, query: ServerInfoQuery) -> BrapiResult<Value> {
    let release = catalog
        .release(&query.version)
        .ok_or_else(|| BrapiError::NotFound(format!("Unknown BrAPI version {}", query.version)))?;

    // BrAPI 1.x spells the key in lower case
    let datatypes_key = if query.version == "v1" { "datatypes" } else { "dataTypes" };
    let calls: Vec<Value> = catalog
        .active_calls(&query.version)
        .into_iter()
        .map(|call| {
            let methods: Vec<&str> = call.setting.methods.iter().map(|m| m.as_str()).collect();
            let mut entry = json!({
                "service": call.path.trim_start_matches('/'),
                "methods": methods,
                "contentTypes": ["application/json"],
                "versions": [release],
            });
            entry[datatypes_key] = json!(["application/json"]);
            entry
        })
        .collect();

    Ok(json!({
        "serverName": "BrAPI Gateway",
        "serverDescription": format!("BrAPI {} release {}", query.version, release),
        "calls": calls,
    }))
}
