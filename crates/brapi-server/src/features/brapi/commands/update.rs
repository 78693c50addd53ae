//! Update one BrAPI object

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::write_fields;
use crate::error::{BrapiError, BrapiResult};
use crate::query::{BrapiEngine, DataRequest};
use crate::storage::scalar_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateObjectCommand {
    pub version: String,
    pub datatype: String,
    /// Identifier from the request path; falls back to the object's own
    pub identifier: Option<String>,
    pub object: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateObjectResponse {
    pub object: Value,
    pub warnings: Vec<String>,
}

impl Request<BrapiResult<UpdateObjectResponse>> for UpdateObjectCommand {}

#[tracing::instrument(skip(engine, command), fields(datatype = %command.datatype))]
pub async fn handle(
    engine: &BrapiEngine,
    command: UpdateObjectCommand,
) -> BrapiResult<UpdateObjectResponse> {
    let mapping = engine.mapping_for(&command.version, &command.datatype)?;

    let identifier_field = mapping.identifier_field();
    if mapping.rule(&identifier_field).is_none() {
        return Err(BrapiError::Unprocessable(format!(
            "Mapping {} does not map its identifier field {}",
            mapping.id, identifier_field
        )));
    }

    let identifier = command
        .identifier
        .clone()
        .or_else(|| {
            command
                .object
                .get(&identifier_field)
                .filter(|value| !value.is_null())
                .map(scalar_text)
        })
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BrapiError::BadInput(format!("Missing identifier {identifier_field}")))?;

    let request = DataRequest::single(BTreeMap::from([(identifier_field.clone(), identifier)]))
        .with_hidden();
    let existing = engine.fetch(mapping, &request).await?;
    let record_id = existing
        .items
        .first()
        .map(|item| item.record_id.clone())
        .ok_or_else(|| BrapiError::NotFound(format!("No {} to update", command.datatype)))?;

    let mut object = command.object;
    object.remove(&identifier_field);
    let written = write_fields(mapping, &object);

    let kind = &mapping.content_target.kind;
    let record = engine.store().update_fields(kind, &record_id, written.fields).await?;
    tracing::info!(kind = %kind, id = %record.id, "Record updated");

    Ok(UpdateObjectResponse {
        object: engine.projector().project(&record, mapping, false).await,
        warnings: written.warnings,
    })
}
