//! Create BrAPI objects

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::write_fields;
use crate::error::{BrapiError, BrapiResult};
use crate::query::{BrapiEngine, DataRequest};
use crate::storage::scalar_text;

/// Command to create one record per input object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateObjectsCommand {
    pub version: String,
    pub datatype: String,
    pub objects: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateObjectsResponse {
    /// Stored objects, re-projected
    pub objects: Vec<Value>,
    pub warnings: Vec<String>,
}

impl Request<BrapiResult<CreateObjectsResponse>> for CreateObjectsCommand {}

impl CreateObjectsCommand {
    pub fn validate(&self) -> BrapiResult<()> {
        if self.objects.is_empty() {
            return Err(BrapiError::BadInput(
                "Expected a non-empty list of objects".to_string(),
            ));
        }
        Ok(())
    }
}

/// Objects are created in order; the first failure stops the batch
#[tracing::instrument(skip(engine, command), fields(datatype = %command.datatype, count = command.objects.len()))]
pub async fn handle(
    engine: &BrapiEngine,
    command: CreateObjectsCommand,
) -> BrapiResult<CreateObjectsResponse> {
    command.validate()?;

    let mapping = engine.mapping_for(&command.version, &command.datatype)?;
    let identifier_field = mapping.identifier_field();
    if mapping.rule(&identifier_field).is_none() {
        return Err(BrapiError::Unprocessable(format!(
            "Mapping {} does not map its identifier field {}",
            mapping.id, identifier_field
        )));
    }

    let mut response = CreateObjectsResponse::default();
    for object in &command.objects {
        let identifier = object
            .get(&identifier_field)
            .filter(|value| !value.is_null())
            .map(scalar_text)
            .filter(|value| !value.is_empty());

        if let Some(identifier) = identifier {
            let request = DataRequest::single(BTreeMap::from([(
                identifier_field.clone(),
                identifier.clone(),
            )]))
            .with_hidden();
            match engine.fetch(mapping, &request).await {
                Ok(existing) if !existing.items.is_empty() => {
                    return Err(BrapiError::Conflict(format!(
                        "{} with {} '{}' already exists",
                        command.datatype, identifier_field, identifier
                    )));
                },
                Ok(_) | Err(BrapiError::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }

        let written = write_fields(mapping, object);
        response.warnings.extend(written.warnings);

        let record = engine
            .store()
            .create(&mapping.content_target, written.id, written.fields)
            .await?;
        tracing::info!(kind = %record.kind, id = %record.id, "Record created");

        response
            .objects
            .push(engine.projector().project(&record, mapping, false).await);
    }

    Ok(response)
}
