//! Delete BrAPI objects

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BrapiError, BrapiResult};
use crate::query::{BrapiEngine, DataRequest};
use crate::storage::FilterValue;

/// Delete every record matching `filters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteObjectsCommand {
    pub version: String,
    pub datatype: String,
    pub filters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteObjectsResponse {
    /// Backend identifiers of the deleted records; empty when nothing matched
    pub deleted: Vec<String>,
}

impl Request<BrapiResult<DeleteObjectsResponse>> for DeleteObjectsCommand {}

impl DeleteObjectsCommand {
    pub fn validate(&self) -> BrapiResult<()> {
        if self.filters.is_empty() {
            return Err(BrapiError::BadInput(
                "Deleting requires identifying parameters".to_string(),
            ));
        }
        // The translator drops blank operands, which would widen the match
        if let Some((key, _)) = self
            .filters
            .iter()
            .find(|(_, value)| FilterValue::from_json((*value).clone()).is_empty())
        {
            return Err(BrapiError::BadInput(format!("Delete filter {key} has no value")));
        }
        Ok(())
    }
}

#[tracing::instrument(skip(engine, command), fields(datatype = %command.datatype))]
pub async fn handle(
    engine: &BrapiEngine,
    command: DeleteObjectsCommand,
) -> BrapiResult<DeleteObjectsResponse> {
    command.validate()?;

    let mapping = engine.mapping_for(&command.version, &command.datatype)?;

    // An ignored filter would widen the match
    if let Some(unmapped) = command.filters.keys().find(|key| mapping.find_rule(key).is_none()) {
        return Err(BrapiError::BadInput(format!("Unsupported delete filter: {unmapped}")));
    }

    let matches = engine
        .fetch(mapping, &DataRequest::search(command.filters).unpaged().with_hidden())
        .await?;
    if let Some(ignored) = matches.warnings.iter().find(|w| w.starts_with("Unsupported")) {
        return Err(BrapiError::BadInput(format!("Rejected delete: {ignored}")));
    }

    let kind = &mapping.content_target.kind;
    let mut response = DeleteObjectsResponse::default();
    for item in matches.items {
        if engine.store().delete(kind, &item.record_id).await? {
            tracing::info!(kind = %kind, id = %item.record_id, "Record deleted");
            response.deleted.push(item.record_id);
        }
    }
    Ok(response)
}
